//! Entity storage and lifecycle
//!
//! Adds and removals are deferred: both are queued and applied at the start
//! and end of [`EntityManager::update`], so the set never changes while the
//! entities are being iterated. Iteration is in id order.

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec2;

use super::entity::{Entity, EntityId, EntityKind, EntityType, Tags, UpdateCtx, UpdateStatus};
use super::events::{EventBus, GameEvent};
use crate::math::{Rect, rect_intersect};
use crate::render::DrawContext;

/// Snapshot of the manager's bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerDebugInfo {
    pub total_entities: usize,
    pub by_type: Vec<(&'static str, usize)>,
    pub pending_additions: usize,
    pub pending_removals: usize,
}

#[derive(Debug)]
pub struct EntityManager {
    entities: BTreeMap<EntityId, Entity>,
    by_type: BTreeMap<EntityType, BTreeSet<EntityId>>,
    by_tag: BTreeMap<Tags, BTreeSet<EntityId>>,
    to_add: Vec<Entity>,
    to_remove: Vec<EntityId>,
    next_id: EntityId,
}

impl Default for EntityManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityManager {
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            by_type: BTreeMap::new(),
            by_tag: BTreeMap::new(),
            to_add: Vec::new(),
            to_remove: Vec::new(),
            next_id: 1,
        }
    }

    /// Allocate a fresh id (never reused within this manager)
    pub fn next_entity_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Build an entity with a fresh id and queue it; returns the id
    pub fn spawn(&mut self, pos: Vec2, kind: EntityKind) -> EntityId {
        let id = self.next_entity_id();
        self.queue_add(Entity::new(id, pos, kind));
        id
    }

    /// Queue for insertion on the next update
    pub fn queue_add(&mut self, entity: Entity) {
        self.to_add.push(entity);
    }

    /// Queue for removal at the end of the next update
    pub fn queue_remove(&mut self, id: EntityId) {
        if !self.to_remove.contains(&id) {
            self.to_remove.push(id);
        }
    }

    pub fn update(&mut self, dt: f64, ctx: &mut UpdateCtx) {
        self.process_additions(ctx.bus);

        let mut expired = Vec::new();
        for (id, entity) in self.entities.iter_mut() {
            if !entity.active {
                if entity.is_destroyed() {
                    expired.push(*id);
                }
                continue;
            }
            if entity.update(dt, ctx) == UpdateStatus::Expired {
                expired.push(*id);
            }
        }
        for id in expired {
            self.queue_remove(id);
        }

        self.snap_docked_balls();
        self.process_removals(ctx.bus);
    }

    /// Apply queued adds and removals without advancing any entity
    pub fn flush(&mut self, bus: &EventBus) {
        self.process_additions(bus);
        self.process_removals(bus);
    }

    /// Keep every docked ball sitting on the first paddle
    fn snap_docked_balls(&mut self) {
        let Some(paddle) = self.first_of_type(EntityType::Paddle).map(Entity::bounds) else {
            return;
        };
        let Some(balls) = self.by_type.get(&EntityType::Ball) else {
            return;
        };
        for id in balls {
            if let Some(entity) = self.entities.get_mut(id)
                && let EntityKind::Ball(ball) = &entity.kind
                && ball.on_paddle
            {
                ball.position_on_paddle(&mut entity.body, &paddle);
            }
        }
    }

    fn process_additions(&mut self, bus: &EventBus) {
        for entity in std::mem::take(&mut self.to_add) {
            let id = entity.id;
            let entity_type = entity.entity_type();
            self.by_type.entry(entity_type).or_default().insert(id);
            for tag in entity.tags.iter() {
                self.by_tag.entry(tag).or_default().insert(id);
            }
            self.entities.insert(id, entity);
            bus.publish(GameEvent::EntityCreated { id, entity_type });
        }
    }

    fn process_removals(&mut self, bus: &EventBus) {
        for id in std::mem::take(&mut self.to_remove) {
            let Some(mut entity) = self.entities.remove(&id) else {
                continue;
            };
            let entity_type = entity.entity_type();
            if let Some(ids) = self.by_type.get_mut(&entity_type) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_type.remove(&entity_type);
                }
            }
            for tag in entity.tags.iter() {
                if let Some(ids) = self.by_tag.get_mut(&tag) {
                    ids.remove(&id);
                    if ids.is_empty() {
                        self.by_tag.remove(&tag);
                    }
                }
            }
            entity.on_destroy();
            bus.publish(GameEvent::EntityDestroyed { id, entity_type });
        }
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Two distinct entities mutably at once
    pub fn get_pair_mut(&mut self, a: EntityId, b: EntityId) -> Option<(&mut Entity, &mut Entity)> {
        if a == b {
            return None;
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let mut range = self.entities.range_mut(lo..=hi);
        let (first_id, first) = range.next()?;
        let (last_id, last) = range.next_back()?;
        if *first_id != lo || *last_id != hi {
            return None;
        }
        if a < b { Some((first, last)) } else { Some((last, first)) }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn ids_by_type(&self, entity_type: EntityType) -> Vec<EntityId> {
        self.by_type
            .get(&entity_type)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Ids carrying `tag` (a single flag)
    pub fn ids_by_tag(&self, tag: Tags) -> Vec<EntityId> {
        self.by_tag
            .get(&tag)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn entities_by_type(&self, entity_type: EntityType) -> impl Iterator<Item = &Entity> {
        self.by_type
            .get(&entity_type)
            .into_iter()
            .flatten()
            .filter_map(|id| self.entities.get(id))
    }

    pub fn first_of_type(&self, entity_type: EntityType) -> Option<&Entity> {
        self.entities_by_type(entity_type).next()
    }

    pub fn all_entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Entities whose bounds overlap `area`
    pub fn entities_in_area(&self, area: &Rect) -> Vec<&Entity> {
        self.entities
            .values()
            .filter(|e| rect_intersect(&e.bounds(), area))
            .collect()
    }

    /// Nearest active entity (by center) to `point`
    pub fn closest_entity(&self, point: Vec2, entity_type: Option<EntityType>) -> Option<&Entity> {
        self.entities
            .values()
            .filter(|e| e.active && entity_type.is_none_or(|t| e.entity_type() == t))
            .map(|e| (e.center().distance(point), e))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, e)| e)
    }

    /// Active entities overlapping `id`
    pub fn intersecting_entities(&self, id: EntityId, entity_type: Option<EntityType>) -> Vec<EntityId> {
        let Some(entity) = self.entities.get(&id) else {
            return Vec::new();
        };
        self.entities
            .values()
            .filter(|other| {
                other.id != id
                    && other.active
                    && entity_type.is_none_or(|t| other.entity_type() == t)
                    && entity.intersects(other)
            })
            .map(|other| other.id)
            .collect()
    }

    pub fn entity_count(&self, entity_type: Option<EntityType>) -> usize {
        match entity_type {
            Some(t) => self.by_type.get(&t).map_or(0, BTreeSet::len),
            None => self.entities.len(),
        }
    }

    pub fn has_entities_of_type(&self, entity_type: EntityType) -> bool {
        self.entity_count(Some(entity_type)) > 0
    }

    /// Drop everything, including queued work. Ids keep counting up.
    pub fn clear(&mut self) {
        for entity in self.entities.values_mut() {
            entity.on_destroy();
        }
        self.entities.clear();
        self.by_type.clear();
        self.by_tag.clear();
        self.to_add.clear();
        self.to_remove.clear();
    }

    pub fn debug_info(&self) -> ManagerDebugInfo {
        ManagerDebugInfo {
            total_entities: self.entities.len(),
            by_type: self
                .by_type
                .iter()
                .map(|(t, ids)| (t.as_str(), ids.len()))
                .collect(),
            pending_additions: self.to_add.len(),
            pending_removals: self.to_remove.len(),
        }
    }

    /// Draw visible entities back to front by layer
    pub fn render(&self, draw: &mut dyn DrawContext) {
        for entity_type in EntityType::RENDER_ORDER {
            for entity in self.entities_by_type(entity_type) {
                entity.render(draw);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::consts::FRAME_MS;
    use crate::render::{Shape, ShapeRecorder};
    use crate::sim::ball::Ball;
    use crate::sim::brick::Brick;
    use crate::sim::events::{EventKind, record};
    use crate::sim::paddle::Paddle;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn tick(manager: &mut EntityManager, config: &Config, bus: &EventBus) {
        let mut rng = Pcg32::seed_from_u64(1);
        let mut ctx = UpdateCtx {
            bus,
            config,
            now: 0.0,
            rng: &mut rng,
        };
        manager.update(FRAME_MS, &mut ctx);
    }

    #[test]
    fn test_deferred_add_and_remove() {
        let config = Config::default();
        let bus = EventBus::new();
        let log = record(&bus, &[EventKind::EntityCreated, EventKind::EntityDestroyed]);
        let mut manager = EntityManager::new();

        let brick = manager.spawn(Vec2::new(35.0, 60.0), EntityKind::Brick(Brick::standard(&config, 0)));
        assert!(manager.get(brick).is_none());
        assert_eq!(manager.debug_info().pending_additions, 1);

        tick(&mut manager, &config, &bus);
        assert!(manager.get(brick).is_some());
        assert_eq!(manager.ids_by_type(EntityType::Brick), vec![brick]);
        assert_eq!(manager.ids_by_tag(Tags::DESTRUCTIBLE), vec![brick]);

        manager.queue_remove(brick);
        manager.queue_remove(brick);
        assert!(manager.get(brick).is_some());
        tick(&mut manager, &config, &bus);
        assert!(manager.get(brick).is_none());
        assert!(!manager.has_entities_of_type(EntityType::Brick));
        assert!(manager.ids_by_tag(Tags::DESTRUCTIBLE).is_empty());
        assert_eq!(manager.debug_info().by_type, vec![]);

        let kinds: Vec<_> = log.borrow().iter().map(GameEvent::kind).collect();
        assert_eq!(kinds, vec![EventKind::EntityCreated, EventKind::EntityDestroyed]);
    }

    #[test]
    fn test_ids_are_monotonic() {
        let config = Config::default();
        let mut manager = EntityManager::new();
        let a = manager.spawn(Vec2::ZERO, EntityKind::Ball(Ball::new(&config)));
        let b = manager.spawn(Vec2::ZERO, EntityKind::Ball(Ball::new(&config)));
        manager.clear();
        let c = manager.next_entity_id();
        assert!(a < b && b < c);
        assert_eq!(manager.entity_count(None), 0);
    }

    #[test]
    fn test_self_destroyed_entities_are_purged() {
        let config = Config::default();
        let bus = EventBus::new();
        let mut manager = EntityManager::new();
        let id = manager.spawn(
            Vec2::new(400.0, 700.0),
            EntityKind::Ball(Ball::multi_ball(&config)),
        );
        // Added, updated (falls out of the playfield) and purged in one pass
        tick(&mut manager, &config, &bus);
        assert!(manager.get(id).is_none());
        assert_eq!(manager.entity_count(None), 0);
    }

    #[test]
    fn test_docked_ball_follows_paddle() {
        let config = Config::default();
        let bus = EventBus::new();
        let mut manager = EntityManager::new();
        let paddle = manager.spawn(Vec2::new(300.0, 550.0), EntityKind::Paddle(Paddle::new(&config)));
        let ball = manager.spawn(Vec2::ZERO, EntityKind::Ball(Ball::new(&config)));
        tick(&mut manager, &config, &bus);
        assert_eq!(manager.get(ball).unwrap().pos(), Vec2::new(350.0, 542.0));

        manager.get_mut(paddle).unwrap().body.pos.x = 100.0;
        tick(&mut manager, &config, &bus);
        assert_eq!(manager.get(ball).unwrap().pos(), Vec2::new(150.0, 542.0));
    }

    #[test]
    fn test_queries() {
        let config = Config::default();
        let bus = EventBus::new();
        let mut manager = EntityManager::new();
        let near = manager.spawn(Vec2::new(0.0, 0.0), EntityKind::Brick(Brick::standard(&config, 0)));
        let far = manager.spawn(Vec2::new(400.0, 0.0), EntityKind::Brick(Brick::steel(&config)));
        let ball = manager.spawn(Vec2::new(70.0, 10.0), EntityKind::Ball(Ball::multi_ball(&config)));
        tick(&mut manager, &config, &bus);

        let closest = manager.closest_entity(Vec2::new(10.0, 10.0), Some(EntityType::Brick));
        assert_eq!(closest.map(|e| e.id), Some(near));
        assert_eq!(manager.intersecting_entities(ball, Some(EntityType::Brick)), vec![near]);
        assert_eq!(manager.ids_by_tag(Tags::STEEL), vec![far]);
        assert_eq!(manager.entities_in_area(&Rect::new(390.0, 0.0, 20.0, 20.0)).len(), 1);
        assert_eq!(manager.entity_count(Some(EntityType::Brick)), 2);

        let (a, b) = manager.get_pair_mut(far, near).unwrap();
        assert_eq!((a.id, b.id), (far, near));
        assert!(manager.get_pair_mut(near, near).is_none());
        assert!(manager.get_pair_mut(near, 999).is_none());
    }

    #[test]
    fn test_render_layer_order() {
        let config = Config::default();
        let bus = EventBus::new();
        let mut manager = EntityManager::new();
        manager.spawn(Vec2::new(300.0, 550.0), EntityKind::Paddle(Paddle::new(&config)));
        manager.spawn(Vec2::new(400.0, 300.0), EntityKind::Ball(Ball::multi_ball(&config)));
        manager.spawn(Vec2::new(0.0, 0.0), EntityKind::Brick(Brick::standard(&config, 0)));
        tick(&mut manager, &config, &bus);

        let mut recorder = ShapeRecorder::default();
        manager.render(&mut recorder);
        assert!(matches!(recorder.shapes.first(), Some(Shape::Rect { .. })));
        assert!(matches!(recorder.shapes.last(), Some(Shape::Circle { .. })));
    }
}
