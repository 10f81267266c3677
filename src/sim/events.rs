//! Session-scoped publish/subscribe bus
//!
//! Systems never hold references to each other; they talk through here.
//! Dispatch is synchronous and reentrant: a handler receives the bus and
//! may publish further events before returning.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use glam::Vec2;

use super::achievements::Achievement;
use super::assist::{AssistanceLevel, PerformanceSnapshot, Trend};
use super::brick::MysteryBonus;
use super::entity::{EntityId, EntityType};
use super::particle::ParticleStyle;
use super::powerup::PowerUpKind;
use crate::config::Color;

/// Subscriber callback. Receives the bus so it can publish reentrantly.
pub type Handler = Rc<dyn Fn(&EventBus, &GameEvent)>;

/// Wrap a closure as a [`Handler`]
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&EventBus, &GameEvent) + 'static,
{
    Rc::new(f)
}

/// Identifies the owner of a group of subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u32);

/// Which wall a ball bounced off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wall {
    Left,
    Right,
    Top,
}

/// What removed a brick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroySource {
    Ball,
    Explosion,
    Chain,
}

/// Where a score bonus came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BonusSource {
    Combo,
    Mystery,
}

/// Event discriminator; subscriptions are keyed by this
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    GameStart,
    GamePause,
    GameResume,
    GameOver,
    GameRestart,
    LevelComplete,
    LevelStart,
    ExtraBall,
    BallLost,
    BallPaddleHit,
    BallWallHit,
    PaddleMissed,
    BrickHit,
    BrickDestroyed,
    BrickExplode,
    ChainReaction,
    ChainFindTargets,
    PowerUpSpawned,
    PowerUpSpawn,
    PowerUpCollected,
    PowerUpActivated,
    PowerUpExpired,
    MultiBallCreate,
    PlayerLifeLost,
    PlayerScoreChanged,
    PlayerLivesChanged,
    ScoreBonus,
    ComboHit,
    ComboBroken,
    ComboBonus,
    AchievementUnlocked,
    AssistanceChanged,
    PerformanceAnalyzed,
    ParticleSpawn,
    ParticleCreate,
    ScreenShake,
    ColorFlash,
    Explosion,
    ComboParticles,
    BonusReveal,
    EntityCreated,
    EntityDestroyed,
    CollisionDetected,
}

impl EventKind {
    /// Wire-style name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::GameStart => "game:start",
            EventKind::GamePause => "game:pause",
            EventKind::GameResume => "game:resume",
            EventKind::GameOver => "game:over",
            EventKind::GameRestart => "game:restart",
            EventKind::LevelComplete => "game:levelComplete",
            EventKind::LevelStart => "game:levelStart",
            EventKind::ExtraBall => "game:extraBall",
            EventKind::BallLost => "ball:lost",
            EventKind::BallPaddleHit => "ball:paddleHit",
            EventKind::BallWallHit => "ball:wallHit",
            EventKind::PaddleMissed => "paddle:missed",
            EventKind::BrickHit => "brick:hit",
            EventKind::BrickDestroyed => "brick:destroyed",
            EventKind::BrickExplode => "brick:explode",
            EventKind::ChainReaction => "chain:reaction",
            EventKind::ChainFindTargets => "chain:findTargets",
            EventKind::PowerUpSpawned => "powerup:spawned",
            EventKind::PowerUpSpawn => "powerup:spawn",
            EventKind::PowerUpCollected => "powerup:collected",
            EventKind::PowerUpActivated => "powerup:activated",
            EventKind::PowerUpExpired => "powerup:expired",
            EventKind::MultiBallCreate => "multiBall:create",
            EventKind::PlayerLifeLost => "player:lifeLost",
            EventKind::PlayerScoreChanged => "player:scoreChanged",
            EventKind::PlayerLivesChanged => "player:livesChanged",
            EventKind::ScoreBonus => "score:bonus",
            EventKind::ComboHit => "combo:hit",
            EventKind::ComboBroken => "combo:broken",
            EventKind::ComboBonus => "combo:bonus",
            EventKind::AchievementUnlocked => "achievement:unlocked",
            EventKind::AssistanceChanged => "ai:assistanceChanged",
            EventKind::PerformanceAnalyzed => "ai:performanceAnalyzed",
            EventKind::ParticleSpawn => "render:particleSpawn",
            EventKind::ParticleCreate => "particle:create",
            EventKind::ScreenShake => "effects:screenShake",
            EventKind::ColorFlash => "effects:colorFlash",
            EventKind::Explosion => "effects:explosion",
            EventKind::ComboParticles => "effects:comboParticles",
            EventKind::BonusReveal => "effects:bonusReveal",
            EventKind::EntityCreated => "system:entityCreated",
            EventKind::EntityDestroyed => "system:entityDestroyed",
            EventKind::CollisionDetected => "system:collisionDetected",
        }
    }
}

/// Everything that can cross the bus, with flat payloads
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    GameStart,
    GamePause,
    GameResume,
    GameOver { score: u64, level: u32 },
    GameRestart,
    LevelComplete { level: u32 },
    LevelStart { level: u32 },
    ExtraBall { pos: Vec2 },

    BallLost { ball: EntityId, pos: Vec2 },
    /// `paddle` is `None` for a launch off a docked paddle
    BallPaddleHit {
        ball: EntityId,
        paddle: Option<EntityId>,
        pos: Vec2,
    },
    BallWallHit { ball: EntityId, wall: Wall, pos: Vec2 },
    PaddleMissed { ball: EntityId },

    BrickHit {
        brick: EntityId,
        pos: Vec2,
        hits_remaining: u32,
        points: u32,
    },
    BrickDestroyed {
        brick: EntityId,
        pos: Vec2,
        points: u32,
        color: Color,
        source: DestroySource,
    },
    BrickExplode {
        brick: EntityId,
        center: Vec2,
        radius: f32,
    },
    ChainReaction {
        source: EntityId,
        targets: Vec<EntityId>,
        pos: Vec2,
    },
    ChainFindTargets {
        brick: EntityId,
        center: Vec2,
        radius: f32,
    },

    PowerUpSpawned {
        powerup: EntityId,
        kind: PowerUpKind,
        pos: Vec2,
    },
    /// Request to spawn a power-up; `None` picks a random kind
    PowerUpSpawn { pos: Vec2, kind: Option<PowerUpKind> },
    PowerUpCollected {
        powerup: EntityId,
        kind: PowerUpKind,
        pos: Vec2,
    },
    PowerUpActivated { kind: PowerUpKind, duration_ms: f64 },
    PowerUpExpired { kind: PowerUpKind },
    MultiBallCreate { pos: Vec2 },

    PlayerLifeLost { lives: u32 },
    PlayerScoreChanged { score: u64, delta: u64 },
    PlayerLivesChanged { lives: u32 },
    ScoreBonus {
        points: u64,
        source: BonusSource,
        multiplier: u32,
    },

    ComboHit {
        combo: u32,
        multiplier: u32,
        new_tier: bool,
    },
    ComboBroken {
        final_combo: u32,
        final_multiplier: u32,
    },
    ComboBonus { amount: u32 },

    AchievementUnlocked {
        achievement: Achievement,
        total_unlocked: u32,
    },

    AssistanceChanged {
        from: AssistanceLevel,
        to: AssistanceLevel,
    },
    PerformanceAnalyzed {
        snapshot: PerformanceSnapshot,
        trend: Trend,
    },

    /// Burst of particle entities
    ParticleSpawn {
        pos: Vec2,
        color: Color,
        count: u32,
        style: ParticleStyle,
    },
    /// Single pooled effect particle (velocity in units/ms)
    ParticleCreate {
        pos: Vec2,
        vel: Vec2,
        color: Color,
        size: f32,
        life_ms: f32,
    },
    ScreenShake { intensity: f32 },
    ColorFlash { color: Color, intensity: f32 },
    Explosion { pos: Vec2, radius: f32, color: Color },
    ComboParticles { combo: u32, multiplier: f32, pos: Vec2 },
    BonusReveal { pos: Vec2, bonus: MysteryBonus },

    EntityCreated { id: EntityId, entity_type: EntityType },
    EntityDestroyed { id: EntityId, entity_type: EntityType },
    CollisionDetected {
        ball: EntityId,
        other: EntityId,
        other_type: EntityType,
        pos: Vec2,
    },
}

impl GameEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GameEvent::GameStart => EventKind::GameStart,
            GameEvent::GamePause => EventKind::GamePause,
            GameEvent::GameResume => EventKind::GameResume,
            GameEvent::GameOver { .. } => EventKind::GameOver,
            GameEvent::GameRestart => EventKind::GameRestart,
            GameEvent::LevelComplete { .. } => EventKind::LevelComplete,
            GameEvent::LevelStart { .. } => EventKind::LevelStart,
            GameEvent::ExtraBall { .. } => EventKind::ExtraBall,
            GameEvent::BallLost { .. } => EventKind::BallLost,
            GameEvent::BallPaddleHit { .. } => EventKind::BallPaddleHit,
            GameEvent::BallWallHit { .. } => EventKind::BallWallHit,
            GameEvent::PaddleMissed { .. } => EventKind::PaddleMissed,
            GameEvent::BrickHit { .. } => EventKind::BrickHit,
            GameEvent::BrickDestroyed { .. } => EventKind::BrickDestroyed,
            GameEvent::BrickExplode { .. } => EventKind::BrickExplode,
            GameEvent::ChainReaction { .. } => EventKind::ChainReaction,
            GameEvent::ChainFindTargets { .. } => EventKind::ChainFindTargets,
            GameEvent::PowerUpSpawned { .. } => EventKind::PowerUpSpawned,
            GameEvent::PowerUpSpawn { .. } => EventKind::PowerUpSpawn,
            GameEvent::PowerUpCollected { .. } => EventKind::PowerUpCollected,
            GameEvent::PowerUpActivated { .. } => EventKind::PowerUpActivated,
            GameEvent::PowerUpExpired { .. } => EventKind::PowerUpExpired,
            GameEvent::MultiBallCreate { .. } => EventKind::MultiBallCreate,
            GameEvent::PlayerLifeLost { .. } => EventKind::PlayerLifeLost,
            GameEvent::PlayerScoreChanged { .. } => EventKind::PlayerScoreChanged,
            GameEvent::PlayerLivesChanged { .. } => EventKind::PlayerLivesChanged,
            GameEvent::ScoreBonus { .. } => EventKind::ScoreBonus,
            GameEvent::ComboHit { .. } => EventKind::ComboHit,
            GameEvent::ComboBroken { .. } => EventKind::ComboBroken,
            GameEvent::ComboBonus { .. } => EventKind::ComboBonus,
            GameEvent::AchievementUnlocked { .. } => EventKind::AchievementUnlocked,
            GameEvent::AssistanceChanged { .. } => EventKind::AssistanceChanged,
            GameEvent::PerformanceAnalyzed { .. } => EventKind::PerformanceAnalyzed,
            GameEvent::ParticleSpawn { .. } => EventKind::ParticleSpawn,
            GameEvent::ParticleCreate { .. } => EventKind::ParticleCreate,
            GameEvent::ScreenShake { .. } => EventKind::ScreenShake,
            GameEvent::ColorFlash { .. } => EventKind::ColorFlash,
            GameEvent::Explosion { .. } => EventKind::Explosion,
            GameEvent::ComboParticles { .. } => EventKind::ComboParticles,
            GameEvent::BonusReveal { .. } => EventKind::BonusReveal,
            GameEvent::EntityCreated { .. } => EventKind::EntityCreated,
            GameEvent::EntityDestroyed { .. } => EventKind::EntityDestroyed,
            GameEvent::CollisionDetected { .. } => EventKind::CollisionDetected,
        }
    }
}

#[derive(Clone)]
struct Subscription {
    serial: u64,
    handler: Handler,
    context: Option<ContextId>,
    once: bool,
}

/// Publish/subscribe channel owned by one session
#[derive(Default)]
pub struct EventBus {
    listeners: RefCell<BTreeMap<EventKind, Vec<Subscription>>>,
    next_serial: Cell<u64>,
    next_context: Cell<u32>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh context for grouping subscriptions
    pub fn new_context(&self) -> ContextId {
        let id = self.next_context.get();
        self.next_context.set(id + 1);
        ContextId(id)
    }

    /// Register a handler; keep `handler` (and `context`) to unsubscribe later
    pub fn subscribe(
        &self,
        kind: EventKind,
        handler: Handler,
        context: Option<ContextId>,
        once: bool,
    ) {
        let serial = self.next_serial.get();
        self.next_serial.set(serial + 1);
        self.listeners
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push(Subscription {
                serial,
                handler,
                context,
                once,
            });
    }

    /// Register a handler that is dropped after its first dispatch
    pub fn subscribe_once(&self, kind: EventKind, handler: Handler, context: Option<ContextId>) {
        self.subscribe(kind, handler, context, true);
    }

    /// Remove the first subscription with this exact handler and context
    pub fn unsubscribe(&self, kind: EventKind, handler: &Handler, context: Option<ContextId>) {
        let mut listeners = self.listeners.borrow_mut();
        let Some(list) = listeners.get_mut(&kind) else {
            return;
        };
        if let Some(index) = list
            .iter()
            .position(|s| Rc::ptr_eq(&s.handler, handler) && s.context == context)
        {
            list.remove(index);
        }
        if list.is_empty() {
            listeners.remove(&kind);
        }
    }

    /// Deliver an event to a snapshot of the current subscribers
    ///
    /// A panicking handler is logged and skipped. One-shot subscriptions are
    /// removed once the whole pass has finished.
    pub fn publish(&self, event: GameEvent) {
        let kind = event.kind();
        let snapshot = match self.listeners.borrow().get(&kind) {
            Some(list) => list.clone(),
            None => return,
        };

        let mut fired_once = Vec::new();
        for sub in &snapshot {
            let handler = Rc::clone(&sub.handler);
            let result = catch_unwind(AssertUnwindSafe(|| handler(self, &event)));
            if result.is_err() {
                log::error!("Error in event handler for {}", kind.as_str());
            }
            if sub.once {
                fired_once.push(sub.serial);
            }
        }

        if !fired_once.is_empty() {
            let mut listeners = self.listeners.borrow_mut();
            if let Some(list) = listeners.get_mut(&kind) {
                list.retain(|s| !fired_once.contains(&s.serial));
                if list.is_empty() {
                    listeners.remove(&kind);
                }
            }
        }
    }

    /// Drop every subscription for one kind, or all of them
    pub fn remove_all_listeners(&self, kind: Option<EventKind>) {
        let mut listeners = self.listeners.borrow_mut();
        match kind {
            Some(kind) => {
                listeners.remove(&kind);
            }
            None => listeners.clear(),
        }
    }

    /// Drop every subscription registered under `context`
    pub fn remove_context(&self, context: ContextId) {
        let mut listeners = self.listeners.borrow_mut();
        for list in listeners.values_mut() {
            list.retain(|s| s.context != Some(context));
        }
        listeners.retain(|_, list| !list.is_empty());
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.borrow().get(&kind).map_or(0, Vec::len)
    }

    pub fn has_listeners(&self, kind: EventKind) -> bool {
        self.listener_count(kind) > 0
    }

    /// Kinds with at least one subscriber, in a stable order
    pub fn event_names(&self) -> Vec<&'static str> {
        self.listeners.borrow().keys().map(EventKind::as_str).collect()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.event_names())
            .finish()
    }
}

/// Record every event of the given kinds (tests and diagnostics)
pub fn record(bus: &EventBus, kinds: &[EventKind]) -> Rc<RefCell<Vec<GameEvent>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    for &kind in kinds {
        let sink = Rc::clone(&log);
        bus.subscribe(
            kind,
            handler(move |_, e| sink.borrow_mut().push(e.clone())),
            None,
            false,
        );
    }
    log
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(bus: &EventBus, kind: EventKind, once: bool) -> (Handler, Rc<Cell<u32>>) {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let handler = handler(move |_, _| h.set(h.get() + 1));
        bus.subscribe(kind, Rc::clone(&handler), None, once);
        (handler, hits)
    }

    #[test]
    fn test_registration_order() {
        let bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = Rc::clone(&order);
            bus.subscribe(
                EventKind::GameStart,
                handler(move |_, _| order.borrow_mut().push(i)),
                None,
                false,
            );
        }
        bus.publish(GameEvent::GameStart);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_once_removed_after_dispatch() {
        let bus = EventBus::new();
        let (_, hits) = counter(&bus, EventKind::GameStart, true);
        bus.publish(GameEvent::GameStart);
        bus.publish(GameEvent::GameStart);
        assert_eq!(hits.get(), 1);
        assert!(!bus.has_listeners(EventKind::GameStart));
    }

    #[test]
    fn test_unsubscribe_exact_match() {
        let bus = EventBus::new();
        let ctx = bus.new_context();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let handler = handler(move |_, _| h.set(h.get() + 1));
        bus.subscribe(EventKind::GamePause, Rc::clone(&handler), Some(ctx), false);

        // Wrong context is a no-op
        bus.unsubscribe(EventKind::GamePause, &handler, None);
        assert_eq!(bus.listener_count(EventKind::GamePause), 1);

        bus.unsubscribe(EventKind::GamePause, &handler, Some(ctx));
        assert_eq!(bus.listener_count(EventKind::GamePause), 0);
        bus.publish(GameEvent::GamePause);
        assert_eq!(hits.get(), 0);
        assert!(bus.event_names().is_empty());
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let bus = EventBus::new();
        bus.subscribe(
            EventKind::GameOver,
            handler(|_, _| panic!("handler fault")),
            None,
            false,
        );
        let (_, hits) = counter(&bus, EventKind::GameOver, false);
        bus.publish(GameEvent::GameOver { score: 0, level: 1 });
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_snapshot_ignores_mid_dispatch_subscribe() {
        let bus = EventBus::new();
        let late_hits = Rc::new(Cell::new(0));
        let late = Rc::clone(&late_hits);
        bus.subscribe(
            EventKind::GameStart,
            handler(move |bus, _| {
                let late = Rc::clone(&late);
                bus.subscribe(
                    EventKind::GameStart,
                    handler(move |_, _| late.set(late.get() + 1)),
                    None,
                    false,
                );
            }),
            None,
            true,
        );
        bus.publish(GameEvent::GameStart);
        assert_eq!(late_hits.get(), 0);
        bus.publish(GameEvent::GameStart);
        assert_eq!(late_hits.get(), 1);
    }

    #[test]
    fn test_reentrant_publish() {
        let bus = EventBus::new();
        bus.subscribe(
            EventKind::GameStart,
            handler(|bus, _| bus.publish(GameEvent::LevelStart { level: 1 })),
            None,
            false,
        );
        let log = record(&bus, &[EventKind::LevelStart]);
        bus.publish(GameEvent::GameStart);
        assert_eq!(*log.borrow(), vec![GameEvent::LevelStart { level: 1 }]);
    }

    #[test]
    fn test_remove_all_and_context() {
        let bus = EventBus::new();
        let ctx = bus.new_context();
        bus.subscribe(EventKind::BallLost, handler(|_, _| {}), Some(ctx), false);
        bus.subscribe(EventKind::BrickHit, handler(|_, _| {}), Some(ctx), false);
        let _ = counter(&bus, EventKind::BrickHit, false);
        assert_eq!(bus.event_names(), vec!["ball:lost", "brick:hit"]);

        bus.remove_context(ctx);
        assert_eq!(bus.listener_count(EventKind::BrickHit), 1);
        assert!(!bus.has_listeners(EventKind::BallLost));

        bus.remove_all_listeners(None);
        assert!(bus.event_names().is_empty());
    }
}
