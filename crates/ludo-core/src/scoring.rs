use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::room::{PawnId, PlayerId, RoomId};

/// Step count that earns the roll bonus (the highest die face).
pub const LUCKY_ROLL: u32 = 6;
/// Bonus added to a move that used the lucky roll.
pub const ROLL_BONUS: u32 = 2;
/// Bonus added to a capture that continues a streak.
pub const COMBO_BONUS: u32 = 5;
/// Streak length at which captures start earning the combo bonus.
pub const COMBO_MIN_STREAK: u32 = 2;
/// Default window within which consecutive captures extend a streak.
pub const DEFAULT_COMBO_WINDOW: Duration = Duration::from_millis(10_000);

/// Room-wide snapshot of aggregate scores, keyed by player id.
pub type ScoreSnapshot = BTreeMap<PlayerId, u32>;

/// One side of a capture: which player's pawn is involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PawnRef {
    pub player_id: PlayerId,
    pub pawn_id: PawnId,
}

/// Result of applying a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    pub pawn_score: u32,
    pub player_total: u32,
    pub bonus: u32,
}

/// Pawn score and aggregate for one side of a capture, after the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSide {
    pub pawn_score: u32,
    pub total: u32,
}

/// Result of applying a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOutcome {
    pub striker: CaptureSide,
    pub victim: CaptureSide,
    pub combo_bonus: u32,
}

/// Bonus earned by a move of `steps`.
pub fn roll_bonus(steps: u32) -> u32 {
    if steps == LUCKY_ROLL { ROLL_BONUS } else { 0 }
}

/// Capture streak bookkeeping for one player. The window is only evaluated
/// when the next capture arrives; nothing expires in the background.
#[derive(Debug, Clone, Copy, Default)]
struct ComboState {
    last_capture: Option<Instant>,
    streak: u32,
}

impl ComboState {
    /// Register a capture at `now` and return the bonus it earns.
    fn record_capture(&mut self, now: Instant, window: Duration) -> u32 {
        let within = self
            .last_capture
            .is_some_and(|last| now.saturating_duration_since(last) <= window);
        self.streak = if within { self.streak.saturating_add(1) } else { 1 };
        self.last_capture = Some(now);
        if self.streak >= COMBO_MIN_STREAK {
            COMBO_BONUS
        } else {
            0
        }
    }
}

#[derive(Debug, Default)]
struct PlayerLedger {
    /// Cached aggregate. Maintained incrementally; see `RoomLedger::handle_capture`
    /// for the one case where it can drift from the pawn sum.
    total: u32,
    pawns: HashMap<PawnId, u32>,
    combo: ComboState,
}

impl PlayerLedger {
    fn pawn_sum(&self) -> u32 {
        self.pawns.values().fold(0u32, |acc, s| acc.saturating_add(*s))
    }
}

/// Capture where striker and victim are pawns of the same player. Capturing
/// a different pawn nets the combo bonus; capturing the striker pawn itself
/// leaves it at zero and takes its score off the aggregate.
fn capture_own_pawn(
    ledger: &mut PlayerLedger,
    striker: &PawnRef,
    victim: &PawnRef,
    combo_bonus: u32,
) -> CaptureOutcome {
    let striker_before = ledger.pawns.get(&striker.pawn_id).copied().unwrap_or(0);
    let victim_before = ledger.pawns.get(&victim.pawn_id).copied().unwrap_or(0);

    if striker.pawn_id == victim.pawn_id {
        ledger.pawns.insert(victim.pawn_id.clone(), 0);
        ledger.total = ledger.total.saturating_sub(striker_before);
    } else {
        ledger.pawns.insert(
            striker.pawn_id.clone(),
            striker_before
                .saturating_add(victim_before)
                .saturating_add(combo_bonus),
        );
        ledger.pawns.insert(victim.pawn_id.clone(), 0);
        ledger.total = ledger.total.saturating_add(combo_bonus);
    }

    CaptureOutcome {
        striker: CaptureSide {
            pawn_score: ledger.pawns.get(&striker.pawn_id).copied().unwrap_or(0),
            total: ledger.total,
        },
        victim: CaptureSide {
            pawn_score: 0,
            total: ledger.total,
        },
        combo_bonus,
    }
}

/// All score state for a single room.
#[derive(Debug, Default)]
pub struct RoomLedger {
    players: HashMap<PlayerId, PlayerLedger>,
}

impl RoomLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-create the ledger for a player. Existing entries are never reset.
    fn ensure_player(&mut self, player_id: &str) -> &mut PlayerLedger {
        self.players.entry(player_id.to_string()).or_default()
    }

    /// Register pawns for a player at zero, leaving already-known pawns alone.
    pub fn set_initial_pawns<I, S>(&mut self, player_id: &str, pawn_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<PawnId>,
    {
        let ledger = self.ensure_player(player_id);
        for id in pawn_ids {
            ledger.pawns.entry(id.into()).or_insert(0);
        }
    }

    /// Advance a pawn by `steps`, adding the roll bonus when earned. The
    /// aggregate moves by the same delta without rescanning the pawns.
    pub fn update_pawn_score(&mut self, player_id: &str, pawn_id: &str, steps: u32) -> MoveOutcome {
        let bonus = roll_bonus(steps);
        let delta = steps.saturating_add(bonus);

        let ledger = self.ensure_player(player_id);
        let pawn = ledger.pawns.entry(pawn_id.to_string()).or_insert(0);
        *pawn = pawn.saturating_add(delta);
        let pawn_score = *pawn;
        ledger.total = ledger.total.saturating_add(delta);

        MoveOutcome {
            pawn_score,
            player_total: ledger.total,
            bonus,
        }
    }

    /// Transfer the victim pawn's score to the striker pawn.
    ///
    /// The victim's aggregate is floored at zero, but the floor is not pushed
    /// back into the victim's other pawns. After a capture that hits the floor
    /// the victim's aggregate is larger than its pawn sum until the next
    /// `calculate_player_score(.., true)`.
    ///
    /// When both sides belong to one player the pawn writes are applied in
    /// order (striker, then victim) and the aggregate moves by their net
    /// change, so it stays equal to the pawn sum. Both sides of the outcome
    /// then report that player's final state.
    pub fn handle_capture(
        &mut self,
        striker: &PawnRef,
        victim: &PawnRef,
        now: Instant,
        combo_window: Duration,
    ) -> CaptureOutcome {
        self.ensure_player(&victim.player_id);
        let striker_ledger = self.ensure_player(&striker.player_id);
        let combo_bonus = striker_ledger.combo.record_capture(now, combo_window);

        if striker.player_id == victim.player_id {
            return capture_own_pawn(striker_ledger, striker, victim, combo_bonus);
        }

        let victim_pawn_score = self.pawn_score(&victim.player_id, &victim.pawn_id).unwrap_or(0);

        let striker_ledger = self.ensure_player(&striker.player_id);
        let striker_pawn = striker_ledger
            .pawns
            .entry(striker.pawn_id.clone())
            .or_insert(0);
        *striker_pawn = striker_pawn
            .saturating_add(victim_pawn_score)
            .saturating_add(combo_bonus);
        let new_striker_pawn = *striker_pawn;
        striker_ledger.total = striker_ledger
            .total
            .saturating_add(victim_pawn_score)
            .saturating_add(combo_bonus);
        let striker_total = striker_ledger.total;

        let victim_ledger = self.ensure_player(&victim.player_id);
        victim_ledger.pawns.insert(victim.pawn_id.clone(), 0);
        victim_ledger.total = victim_ledger.total.saturating_sub(victim_pawn_score);

        CaptureOutcome {
            striker: CaptureSide {
                pawn_score: new_striker_pawn,
                total: striker_total,
            },
            victim: CaptureSide {
                pawn_score: 0,
                total: victim_ledger.total,
            },
            combo_bonus,
        }
    }

    /// Read a player's aggregate. With `recompute`, rebuild it from the pawn
    /// scores first and store the result.
    pub fn calculate_player_score(&mut self, player_id: &str, recompute: bool) -> u32 {
        let ledger = self.ensure_player(player_id);
        if recompute {
            ledger.total = ledger.pawn_sum();
        }
        ledger.total
    }

    pub fn scores(&self) -> ScoreSnapshot {
        self.players
            .iter()
            .map(|(id, ledger)| (id.clone(), ledger.total))
            .collect()
    }

    pub fn pawn_score(&self, player_id: &str, pawn_id: &str) -> Option<u32> {
        self.players.get(player_id)?.pawns.get(pawn_id).copied()
    }

    /// Current capture streak of a player (0 if they never captured).
    pub fn combo_streak(&self, player_id: &str) -> u32 {
        self.players
            .get(player_id)
            .map_or(0, |ledger| ledger.combo.streak)
    }
}

/// Process-wide score state, partitioned by room.
///
/// Each room's ledger sits behind its own mutex so that every multi-step
/// update on a room is indivisible, while operations on different rooms
/// never contend on the same lock.
pub struct ScoringEngine {
    rooms: RwLock<HashMap<RoomId, Arc<Mutex<RoomLedger>>>>,
    combo_window: Duration,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(DEFAULT_COMBO_WINDOW)
    }
}

impl ScoringEngine {
    pub fn new(combo_window: Duration) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            combo_window,
        }
    }

    pub fn combo_window(&self) -> Duration {
        self.combo_window
    }

    /// Get-or-create the ledger handle for a room.
    fn room(&self, room_id: &str) -> Arc<Mutex<RoomLedger>> {
        if let Some(room) = self
            .rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room_id)
        {
            return Arc::clone(room);
        }
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(rooms.entry(room_id.to_string()).or_default())
    }

    /// Run `f` with exclusive access to a room's ledger, creating it if needed.
    fn with_room<R>(&self, room_id: &str, f: impl FnOnce(&mut RoomLedger) -> R) -> R {
        let room = self.room(room_id);
        let mut ledger = room.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut ledger)
    }

    /// Run `f` against an existing room without creating it.
    fn read_room<R>(&self, room_id: &str, f: impl FnOnce(&RoomLedger) -> R) -> Option<R> {
        let room = self
            .rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room_id)
            .map(Arc::clone)?;
        let ledger = room.lock().unwrap_or_else(PoisonError::into_inner);
        Some(f(&ledger))
    }

    pub fn set_initial_pawns(&self, room_id: &str, player_id: &str, pawn_ids: &[PawnId]) {
        self.with_room(room_id, |ledger| {
            ledger.set_initial_pawns(player_id, pawn_ids.iter().cloned());
        });
        tracing::debug!(
            room_id,
            player_id,
            pawns = pawn_ids.len(),
            "initial pawns registered"
        );
    }

    pub fn update_pawn_score(
        &self,
        room_id: &str,
        player_id: &str,
        pawn_id: &str,
        steps: u32,
    ) -> MoveOutcome {
        let outcome = self.with_room(room_id, |ledger| {
            ledger.update_pawn_score(player_id, pawn_id, steps)
        });
        tracing::debug!(
            room_id,
            player_id,
            pawn_id,
            steps,
            bonus = outcome.bonus,
            total = outcome.player_total,
            "pawn score updated"
        );
        outcome
    }

    pub fn handle_capture(&self, room_id: &str, striker: &PawnRef, victim: &PawnRef) -> CaptureOutcome {
        self.handle_capture_at(room_id, striker, victim, Instant::now())
    }

    /// `handle_capture` with an explicit clock reading.
    pub fn handle_capture_at(
        &self,
        room_id: &str,
        striker: &PawnRef,
        victim: &PawnRef,
        now: Instant,
    ) -> CaptureOutcome {
        let window = self.combo_window;
        let outcome = self.with_room(room_id, |ledger| {
            ledger.handle_capture(striker, victim, now, window)
        });
        tracing::info!(
            room_id,
            striker = %striker.player_id,
            striker_pawn = %striker.pawn_id,
            victim = %victim.player_id,
            victim_pawn = %victim.pawn_id,
            combo_bonus = outcome.combo_bonus,
            striker_total = outcome.striker.total,
            victim_total = outcome.victim.total,
            "capture applied"
        );
        outcome
    }

    pub fn calculate_player_score(&self, room_id: &str, player_id: &str, recompute: bool) -> u32 {
        self.with_room(room_id, |ledger| {
            ledger.calculate_player_score(player_id, recompute)
        })
    }

    /// Snapshot of every player's aggregate in a room. Unknown rooms yield an
    /// empty snapshot and are not created.
    pub fn get_scores(&self, room_id: &str) -> ScoreSnapshot {
        self.read_room(room_id, RoomLedger::scores)
            .unwrap_or_default()
    }

    pub fn pawn_score(&self, room_id: &str, player_id: &str, pawn_id: &str) -> Option<u32> {
        self.read_room(room_id, |ledger| ledger.pawn_score(player_id, pawn_id))
            .flatten()
    }

    pub fn combo_streak(&self, room_id: &str, player_id: &str) -> u32 {
        self.read_room(room_id, |ledger| ledger.combo_streak(player_id))
            .unwrap_or(0)
    }

    /// Number of rooms that have score state.
    pub fn room_count(&self) -> usize {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
