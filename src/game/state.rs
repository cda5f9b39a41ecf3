//! Game session - one board from the first shot to game over.
//!
//! [`GridSession`] strings the engine together: aim, settle, clear, drop
//! unsupported bubbles, top the board up with new rows, and check the danger
//! line. Evaluation of a shot is deferred until its flight is over, so every
//! shot carries the session generation it was fired in. Ending or restarting
//! the session bumps the generation and turns late evaluations into no-ops.
//!
//! The Bevy side lives at the bottom of this file: the session is a resource,
//! requests and results travel as messages and pending shots wait on timers.

use std::{collections::BTreeSet, time::Duration};

use bevy::prelude::*;
use rand::Rng;

use super::{
    bubble::{BubbleId, BubbleLedger, BubbleSource, BubbleState, ColorId},
    cluster::{ClearPattern, ClearedCluster, ClusterMember, MatchEngine},
    config::BoardConfig,
    error::{GridError, Result},
    grid::{HexGrid, Occupant},
    hex::HexCoord,
    projectile::SlotResolver,
    shooter::{BoardColliders, CollisionQuery, Impact, Path, TrajectoryPlanner, aim_direction},
    support::detach_unsupported,
};

/// Something the caller should react to, drained with [`GridSession::drain_events`].
///
/// Positions are in world space.
#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    ClusterCleared {
        members: Vec<ClusterMember>,
        centroid: Vec2,
    },
    BubblesUnsupported {
        members: Vec<ClusterMember>,
        centroid: Vec2,
    },
    PathComputed {
        vertices: Vec<Vec2>,
    },
    SlotResolved {
        cell: HexCoord,
    },
}

/// A computed aim: the path and the cell the shot would settle in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Aim {
    pub path: Path,
    pub predicted: Option<HexCoord>,
    /// Bubbles the loaded shot would clear if fired along this path.
    pub affected: BTreeSet<HexCoord>,
}

/// A bubble waiting in the launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shot {
    pub color: ColorId,
    pub effect: ClearPattern,
}

impl Shot {
    pub fn plain(color: ColorId) -> Self {
        Self {
            color,
            effect: ClearPattern::Match,
        }
    }
}

/// The loaded shot and the one after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShotQueue {
    pub current: Option<Shot>,
    pub next: Option<Shot>,
}

/// A fired bubble waiting for its evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotTicket {
    pub bubble: BubbleId,
    pub color: ColorId,
    /// Where the bubble settled, or would have for effects that vanish.
    pub cell: HexCoord,
    /// The bubble the shot stopped against.
    pub hit: Option<HexCoord>,
    pub effect: ClearPattern,
    /// Bubbles on the line through the first path segment.
    pub ray: Vec<HexCoord>,
    /// Seconds until the projectile arrives.
    pub flight_duration: f32,
    pub generation: u64,
}

/// What an evaluation did.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShotReport {
    /// The ticket belonged to an ended or restarted session.
    pub stale: bool,
    pub cleared: Option<ClearedCluster>,
    pub fallen: Option<ClearedCluster>,
    pub game_over: bool,
    pub board_cleared: bool,
}

#[derive(Resource, Debug)]
pub struct GridSession {
    config: BoardConfig,
    grid: HexGrid,
    planner: TrajectoryPlanner,
    matcher: MatchEngine,
    /// World position of cell (0, 0).
    origin: Vec2,
    live: bool,
    generation: u64,
    shots: ShotQueue,
    /// Grows until drained.
    events: Vec<GridEvent>,
}

impl FromWorld for GridSession {
    fn from_world(world: &mut World) -> Self {
        let config = world.get_resource::<BoardConfig>().cloned().unwrap_or_default();
        if let Err(e) = config.validate() {
            warn!("{e}, using the default board config");
            return Self::new(BoardConfig::default());
        }
        Self::new(config)
    }
}

impl GridSession {
    pub fn new(config: BoardConfig) -> Self {
        Self {
            grid: HexGrid::new(config.layout(), config.base_row),
            planner: TrajectoryPlanner::new(&config),
            matcher: MatchEngine::new(config.cluster_threshold),
            origin: config.grid_origin(),
            live: false,
            generation: 0,
            shots: ShotQueue::default(),
            events: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn grid(&self) -> &HexGrid {
        &self.grid
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// World position of a cell, including the current scroll.
    pub fn cell_to_world(&self, cell: HexCoord) -> Vec2 {
        self.origin + self.grid.cell_to_world(cell)
    }

    /// Move the whole board by `delta` in world space.
    pub fn scroll(&mut self, delta: Vec2) {
        self.origin += delta;
    }

    pub fn set_origin(&mut self, origin: Vec2) {
        self.origin = origin;
    }

    /// Scroll vertically so the lowest bubble sits at `y`.
    pub fn align_lowest_to(&mut self, y: f32) {
        if let Some(lowest) = self.lowest_bubble_y() {
            self.origin.y += y - lowest;
        }
    }

    /// Fill the board from a resolved color pattern and start a new round.
    ///
    /// Pattern row 0 lands on `base_row`, index `i` of a pattern row is
    /// column `i`. Colors on non-playable cells are skipped. Returns the
    /// number of bubbles placed.
    pub fn load_pattern(
        &mut self,
        rows: &[Vec<Option<ColorId>>],
        source: &mut impl BubbleSource,
    ) -> Result<usize> {
        self.release_all(source);
        let top_row = self.config.base_row + (rows.len() as i32 - 1).max(0);
        self.grid = HexGrid::new(self.config.layout(), top_row);

        let mut placed = 0;
        for (offset, colors) in rows.iter().enumerate() {
            let row = self.config.base_row + offset as i32;
            for (col, color) in colors.iter().enumerate() {
                let Some(color) = *color else {
                    continue;
                };
                let cell = HexCoord::new(row, col as i32);
                if !self.grid.is_playable(cell) {
                    continue;
                }
                self.spawn(cell, color, source)?;
                placed += 1;
            }
        }

        self.live = true;
        self.generation += 1;
        self.shots = ShotQueue::default();
        info!(
            "Loaded pattern: {} bubbles, top row {}",
            placed,
            self.grid.top_row()
        );
        Ok(placed)
    }

    /// Reset the scroll and reload a pattern.
    pub fn restart(
        &mut self,
        rows: &[Vec<Option<ColorId>>],
        source: &mut impl BubbleSource,
    ) -> Result<usize> {
        self.origin = self.config.grid_origin();
        self.load_pattern(rows, source)
    }

    /// Stop the round. Pending evaluations become no-ops.
    pub fn end_game(&mut self) {
        if self.live {
            info!("Game over after generation {}", self.generation);
        }
        self.live = false;
        self.generation += 1;
    }

    /// Snapshot of the board's colliders in world space.
    pub fn colliders(&self) -> BoardColliders {
        BoardColliders::from_grid(&self.grid, self.origin, &self.config)
    }

    /// Compute the path from `start` toward `target`, the cell it would
    /// settle in and what the loaded shot would clear there.
    ///
    /// Queues `PathComputed` and `SlotResolved` events. Callers driving the
    /// session without the plugin must call [`GridSession::drain_events`].
    pub fn aim(&mut self, start: Vec2, target: Vec2, query: &impl CollisionQuery) -> Aim {
        let Some(direction) = aim_direction(start, target, self.config.max_aim_angle) else {
            return Aim::default();
        };
        let path = self.planner.plan(start, direction, query);
        let predicted = self.resolve_path(&path).ok();
        let affected = predicted
            .map(|cell| self.affected_cells(&path, cell))
            .unwrap_or_default();

        self.events.push(GridEvent::PathComputed {
            vertices: path.vertices.clone(),
        });
        if let Some(cell) = predicted {
            self.events.push(GridEvent::SlotResolved { cell });
        }

        Aim {
            path,
            predicted,
            affected,
        }
    }

    pub fn shots(&self) -> ShotQueue {
        self.shots
    }

    /// Load plain bubbles into any empty launcher slot.
    pub fn refill_shots(&mut self, rng: &mut impl Rng) {
        if self.shots.current.is_none() {
            self.shots.current = self.next_color(rng).map(Shot::plain);
        }
        if self.shots.next.is_none() {
            self.shots.next = self.next_color(rng).map(Shot::plain);
        }
    }

    /// Exchange the loaded shot with the next one.
    pub fn swap_shots(&mut self) {
        std::mem::swap(&mut self.shots.current, &mut self.shots.next);
    }

    /// Turn the loaded shot into an effect bubble. Returns `false` when the
    /// launcher is empty.
    pub fn arm_effect(&mut self, effect: ClearPattern) -> bool {
        match self.shots.current.as_mut() {
            Some(shot) => {
                shot.effect = effect;
                true
            }
            None => false,
        }
    }

    /// Fire the loaded shot and move the queue along.
    pub fn fire_current(
        &mut self,
        aim: &Aim,
        rng: &mut impl Rng,
        source: &mut impl BubbleSource,
    ) -> Result<ShotTicket> {
        self.refill_shots(rng);
        let Some(shot) = self.shots.current else {
            return Err(GridError::NoTarget);
        };
        let ticket = self.fire(aim, shot.color, shot.effect, source)?;
        self.shots.current = self.shots.next.take();
        self.refill_shots(rng);
        Ok(ticket)
    }

    /// Fire along an aim. Normal bubbles settle in the grid right away; effect
    /// bubbles stay in flight and vanish when evaluated.
    pub fn fire(
        &mut self,
        aim: &Aim,
        color: ColorId,
        effect: ClearPattern,
        source: &mut impl BubbleSource,
    ) -> Result<ShotTicket> {
        if !self.live {
            return Err(GridError::SessionOver);
        }
        let cell = self.resolve_path(&aim.path)?;
        let hit = path_hit(&aim.path);
        let ray = if effect == ClearPattern::Ray {
            self.ray_cells(&aim.path)
        } else {
            Vec::new()
        };

        let bubble = source.acquire(color);
        if !effect.consumes_projectile() {
            if let Err(e) = self.grid.set(cell, Occupant { id: bubble, color }) {
                source.release(bubble);
                return Err(e);
            }
            source.set_state(bubble, BubbleState::Grid);
            source.set_cell(bubble, Some(cell));
            source.set_position(bubble, self.cell_to_world(cell));
        }

        let flight_duration = aim.path.flight_duration(self.config.projectile_speed);
        debug!(
            "Fired {} {} toward {} ({:?}, {:.2}s)",
            color, bubble, cell, effect, flight_duration
        );

        Ok(ShotTicket {
            bubble,
            color,
            cell,
            hit,
            effect,
            ray,
            flight_duration,
            generation: self.generation,
        })
    }

    /// Seconds to wait after firing before calling [`GridSession::evaluate`].
    pub fn evaluation_delay(&self, ticket: &ShotTicket) -> f32 {
        ticket.flight_duration + self.config.settle_delay
    }

    /// Clear what the shot matched, drop what lost support and check the
    /// danger line.
    ///
    /// Queues `ClusterCleared` and `BubblesUnsupported` events, see
    /// [`GridSession::drain_events`].
    pub fn evaluate(
        &mut self,
        ticket: &ShotTicket,
        source: &mut impl BubbleSource,
    ) -> Result<ShotReport> {
        if !self.live || ticket.generation != self.generation {
            debug!(
                "Skipping stale shot from generation {} (now {})",
                ticket.generation, self.generation
            );
            return Ok(ShotReport {
                stale: true,
                ..default()
            });
        }

        if ticket.effect.consumes_projectile() {
            if source.color(ticket.bubble).is_none() {
                return Err(GridError::UnknownBubble { id: ticket.bubble });
            }
            source.set_state(ticket.bubble, BubbleState::Falling);
            source.release(ticket.bubble);
        }

        let cleared = self.matcher.clear(
            &mut self.grid,
            ticket.effect,
            ticket.cell,
            ticket.hit,
            &ticket.ray,
        )?;

        let mut report = ShotReport::default();
        if let Some(cleared) = cleared {
            self.retire(&cleared, source);
            self.events.push(GridEvent::ClusterCleared {
                members: cleared.members.clone(),
                centroid: self.origin + cleared.centroid,
            });

            if let Some(fallen) = detach_unsupported(&mut self.grid)? {
                info!("{} bubbles fell", fallen.len());
                self.retire(&fallen, source);
                self.events.push(GridEvent::BubblesUnsupported {
                    members: fallen.members.clone(),
                    centroid: self.origin + fallen.centroid,
                });
                report.fallen = Some(fallen);
            }
            report.cleared = Some(cleared);
        }

        report.board_cleared = self.grid.is_empty();
        if self.is_below_danger_line() {
            self.end_game();
            report.game_over = true;
        }
        Ok(report)
    }

    /// Append `count` rows of random palette colors on top of the board.
    pub fn append_rows(
        &mut self,
        count: usize,
        rng: &mut impl Rng,
        source: &mut impl BubbleSource,
    ) -> Result<usize> {
        let mut placed = 0;
        for _ in 0..count {
            let row = self.grid.append_row();
            for col in 0..=self.grid.columns() {
                let cell = HexCoord::new(row, col);
                if !self.grid.is_playable(cell) {
                    continue;
                }
                let Some(color) = ColorId::random(&self.config.palette, rng) else {
                    continue;
                };
                self.spawn(cell, color, source)?;
                placed += 1;
            }
        }
        if count > 0 {
            debug!("Appended {} rows, top row now {}", count, self.grid.top_row());
        }
        Ok(placed)
    }

    /// Rows between the lowest bubble and the top row, inclusive.
    pub fn rows_on_board(&self) -> usize {
        self.grid
            .lowest_row()
            .map_or(0, |lowest| (self.grid.top_row() - lowest + 1) as usize)
    }

    /// Append rows until `visible_rows` rows are on the board. A cleared board
    /// stays cleared.
    pub fn top_up(&mut self, rng: &mut impl Rng, source: &mut impl BubbleSource) -> Result<usize> {
        if self.grid.is_empty() {
            return Ok(0);
        }
        let missing = self.config.visible_rows.max(0) as usize;
        let missing = missing.saturating_sub(self.rows_on_board());
        self.append_rows(missing, rng, source)
    }

    /// Color for the next shot, biased toward colors still on the board.
    pub fn next_color(&self, rng: &mut impl Rng) -> Option<ColorId> {
        ColorId::random_weighted(&self.config.palette, &self.grid.colors_present(), rng)
    }

    /// World y of the lowest bubble's center.
    pub fn lowest_bubble_y(&self) -> Option<f32> {
        self.grid
            .lowest_row()
            .map(|row| self.cell_to_world(HexCoord::new(row, 0)).y)
    }

    pub fn is_below_danger_line(&self) -> bool {
        self.lowest_bubble_y()
            .is_some_and(|y| y < self.config.danger_line_y)
    }

    pub fn drain_events(&mut self) -> Vec<GridEvent> {
        std::mem::take(&mut self.events)
    }

    fn resolve_path(&self, path: &Path) -> Result<HexCoord> {
        let (Some(impact), Some(end)) = (path.impact, path.end()) else {
            return Err(GridError::NoTarget);
        };
        SlotResolver::new(&self.grid).resolve_impact(impact, end - self.origin)
    }

    /// Every bubble on the straight line through the first path segment,
    /// out to the full ray length.
    fn ray_cells(&self, path: &Path) -> Vec<HexCoord> {
        let [start, end, ..] = path.vertices.as_slice() else {
            return Vec::new();
        };
        self.colliders()
            .cells_along(*start, *end - *start, self.config.max_ray_length)
    }

    fn affected_cells(&self, path: &Path, cell: HexCoord) -> BTreeSet<HexCoord> {
        let hit = path_hit(path);
        let Some(shot) = self.shots.current else {
            return hit.into_iter().collect();
        };

        if shot.effect.consumes_projectile() {
            let ray = if shot.effect == ClearPattern::Ray {
                self.ray_cells(path)
            } else {
                Vec::new()
            };
            return self.matcher.select(&self.grid, shot.effect, cell, hit, &ray);
        }

        // Settle a stand-in on a scratch copy to see what the bubble would join.
        let mut scratch = self.grid.clone();
        let stand_in = Occupant {
            id: BubbleId(u64::MAX),
            color: shot.color,
        };
        if scratch.set(cell, stand_in).is_err() {
            return BTreeSet::new();
        }
        let mut cells = self.matcher.select(&scratch, shot.effect, cell, hit, &[]);
        cells.remove(&cell);
        cells
    }

    fn spawn(&mut self, cell: HexCoord, color: ColorId, source: &mut impl BubbleSource) -> Result<()> {
        let id = source.acquire(color);
        if let Err(e) = self.grid.set(cell, Occupant { id, color }) {
            source.release(id);
            return Err(e);
        }
        source.set_state(id, BubbleState::Grid);
        source.set_cell(id, Some(cell));
        source.set_position(id, self.cell_to_world(cell));
        Ok(())
    }

    fn retire(&self, cluster: &ClearedCluster, source: &mut impl BubbleSource) {
        for member in &cluster.members {
            source.set_cell(member.id, None);
            source.set_state(member.id, BubbleState::Falling);
            source.release(member.id);
        }
    }

    fn release_all(&mut self, source: &mut impl BubbleSource) {
        for (_, occupant) in self.grid.iter() {
            source.release(occupant.id);
        }
        self.grid.clear_all();
    }
}

fn path_hit(path: &Path) -> Option<HexCoord> {
    match path.impact {
        Some(Impact::Bubble(hit)) => Some(hit),
        _ => None,
    }
}

pub(super) fn plugin(app: &mut App) {
    app.init_resource::<BoardConfig>();
    app.init_resource::<BubbleLedger>();
    app.init_resource::<GridSession>();
    app.init_resource::<PendingShots>();

    app.add_message::<AimRequested>();
    app.add_message::<FireShot>();
    app.add_message::<SwapShots>();
    app.add_message::<ArmEffect>();
    app.add_message::<PathComputed>();
    app.add_message::<SlotResolved>();
    app.add_message::<ClusterCleared>();
    app.add_message::<BubblesUnsupported>();
    app.add_message::<GameOver>();

    app.add_systems(
        Update,
        (
            handle_shot_queue,
            handle_aim_requests,
            handle_fire_requests,
            evaluate_pending_shots,
            publish_grid_events,
        )
            .chain(),
    );
}

/// Ask for an aim preview from `start` toward `target`.
#[derive(Message, Debug, Clone)]
pub struct AimRequested {
    pub start: Vec2,
    pub target: Vec2,
}

/// Fire from `start` toward `target`. Without a color the loaded shot is
/// fired and `effect` is ignored.
#[derive(Message, Debug, Clone)]
pub struct FireShot {
    pub start: Vec2,
    pub target: Vec2,
    pub color: Option<ColorId>,
    pub effect: ClearPattern,
}

/// Exchange the loaded shot with the next one.
#[derive(Message, Debug, Clone, Copy)]
pub struct SwapShots;

/// Turn the loaded shot into an effect bubble.
#[derive(Message, Debug, Clone, Copy)]
pub struct ArmEffect {
    pub effect: ClearPattern,
}

#[derive(Message, Debug, Clone)]
pub struct PathComputed {
    pub vertices: Vec<Vec2>,
}

#[derive(Message, Debug, Clone)]
pub struct SlotResolved {
    pub cell: HexCoord,
}

#[derive(Message, Debug, Clone)]
pub struct ClusterCleared {
    pub members: Vec<ClusterMember>,
    pub centroid: Vec2,
}

#[derive(Message, Debug, Clone)]
pub struct BubblesUnsupported {
    pub members: Vec<ClusterMember>,
    pub centroid: Vec2,
}

#[derive(Message, Debug, Clone)]
pub struct GameOver {
    pub generation: u64,
}

/// Shots in flight, each evaluated when its timer finishes.
#[derive(Resource, Debug, Default)]
pub struct PendingShots(pub Vec<(Timer, ShotTicket)>);

fn handle_shot_queue(
    mut session: ResMut<GridSession>,
    mut swaps: MessageReader<SwapShots>,
    mut effects: MessageReader<ArmEffect>,
) {
    let mut rng = rand::rng();
    for _ in swaps.read() {
        session.refill_shots(&mut rng);
        session.swap_shots();
    }
    for request in effects.read() {
        session.refill_shots(&mut rng);
        session.arm_effect(request.effect);
    }
}

fn handle_aim_requests(mut session: ResMut<GridSession>, mut requests: MessageReader<AimRequested>) {
    for request in requests.read() {
        let colliders = session.colliders();
        session.aim(request.start, request.target, &colliders);
    }
}

fn handle_fire_requests(
    mut session: ResMut<GridSession>,
    mut ledger: ResMut<BubbleLedger>,
    mut pending: ResMut<PendingShots>,
    mut requests: MessageReader<FireShot>,
    mut game_over: MessageWriter<GameOver>,
) {
    let mut rng = rand::rng();
    for request in requests.read() {
        let colliders = session.colliders();
        let aim = session.aim(request.start, request.target, &colliders);
        let fired = match request.color {
            Some(color) => session.fire(&aim, color, request.effect, &mut *ledger),
            None => session.fire_current(&aim, &mut rng, &mut *ledger),
        };

        match fired {
            Ok(ticket) => {
                let delay = session.evaluation_delay(&ticket);
                let delay = Duration::try_from_secs_f32(delay).unwrap_or_else(|e| {
                    warn!("Bad evaluation delay {delay}: {e}");
                    Duration::ZERO
                });
                pending.0.push((Timer::new(delay, TimerMode::Once), ticket));
            }
            Err(GridError::NoFreeSlot { cell }) => {
                // Nowhere left to put the bubble: the board is full.
                warn!("No free slot around {cell}, ending the game");
                let generation = session.generation();
                session.end_game();
                game_over.write(GameOver { generation });
            }
            Err(GridError::NoTarget) => debug!("Nothing to shoot at"),
            Err(e) => warn!("Shot rejected: {e}"),
        }
    }
}

fn evaluate_pending_shots(
    time: Res<Time>,
    mut session: ResMut<GridSession>,
    mut ledger: ResMut<BubbleLedger>,
    mut pending: ResMut<PendingShots>,
    mut game_over: MessageWriter<GameOver>,
) {
    for (timer, _) in pending.0.iter_mut() {
        timer.tick(time.delta());
    }

    let (ready, waiting): (Vec<_>, Vec<_>) = pending
        .0
        .drain(..)
        .partition(|(timer, _)| timer.just_finished());
    pending.0 = waiting;

    let mut rng = rand::rng();
    for (_, ticket) in ready {
        match session.evaluate(&ticket, &mut *ledger) {
            Ok(report) if report.game_over => {
                game_over.write(GameOver {
                    generation: ticket.generation,
                });
            }
            Ok(report) if !report.stale => {
                if let Err(e) = session.top_up(&mut rng, &mut *ledger) {
                    warn!("Could not top up the board: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Shot evaluation failed: {e}"),
        }
    }
}

fn publish_grid_events(
    mut session: ResMut<GridSession>,
    mut paths: MessageWriter<PathComputed>,
    mut slots: MessageWriter<SlotResolved>,
    mut cleared: MessageWriter<ClusterCleared>,
    mut unsupported: MessageWriter<BubblesUnsupported>,
) {
    for event in session.drain_events() {
        match event {
            GridEvent::PathComputed { vertices } => {
                paths.write(PathComputed { vertices });
            }
            GridEvent::SlotResolved { cell } => {
                slots.write(SlotResolved { cell });
            }
            GridEvent::ClusterCleared { members, centroid } => {
                cleared.write(ClusterCleared { members, centroid });
            }
            GridEvent::BubblesUnsupported { members, centroid } => {
                unsupported.write(BubblesUnsupported { members, centroid });
            }
        }
    }
}
