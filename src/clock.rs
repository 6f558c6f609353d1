use bevy::prelude::*;

use crate::components::Alive;
use crate::events::GameEventBus;
use crate::game_runtime::SimSet;
use crate::script::{ScriptAction, ScriptQueue};

/// Upper bound on simulated time consumed per tick. A slow frame advances the
/// world by at most this much so entities cannot tunnel through thin walls.
pub const MAX_TICK_SECONDS: f32 = 0.1;

pub struct ClockPlugin;

impl Plugin for ClockPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(Clock::default()).add_systems(
            FixedUpdate,
            tick_clock
                .in_set(SimSet::Clock)
                .run_if(crate::game_runtime::gameplay_systems_enabled),
        );
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TimerHandle(u64);

/// What a timer does when it fires. Tasks are plain data so nothing here
/// captures entity references that could dangle.
#[derive(Clone)]
pub enum ScheduledTask {
    Emit {
        name: String,
        data: serde_json::Value,
    },
    Actions(Vec<ScriptAction>),
}

struct Entry {
    handle: TimerHandle,
    fire_at: f64,
    interval: Option<f32>,
    owner: Option<Entity>,
    task: ScheduledTask,
    cancelled: bool,
}

/// Virtual, pausable simulated timeline. `now` only moves through `advance`,
/// driven once per fixed tick.
#[derive(Resource, Default)]
pub struct Clock {
    now: f64,
    pub paused: bool,
    entries: Vec<Entry>,
    next_handle: u64,
}

impl Clock {
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn advance(&mut self, dt: f32) {
        if self.paused {
            return;
        }
        self.now += dt.clamp(0.0, MAX_TICK_SECONDS) as f64;
    }

    pub fn after(&mut self, delay: f32, task: ScheduledTask) -> TimerHandle {
        self.schedule(delay, None, None, task)
    }

    pub fn every(&mut self, interval: f32, task: ScheduledTask) -> TimerHandle {
        self.schedule(interval, Some(interval), None, task)
    }

    /// Like `after`/`every` but the timer is dropped unfired if `owner` is
    /// dead when it comes due.
    pub fn after_owned(&mut self, delay: f32, owner: Entity, task: ScheduledTask) -> TimerHandle {
        self.schedule(delay, None, Some(owner), task)
    }

    pub fn every_owned(&mut self, interval: f32, owner: Entity, task: ScheduledTask) -> TimerHandle {
        self.schedule(interval, Some(interval), Some(owner), task)
    }

    fn schedule(
        &mut self,
        delay: f32,
        interval: Option<f32>,
        owner: Option<Entity>,
        task: ScheduledTask,
    ) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        self.entries.push(Entry {
            handle,
            fire_at: self.now + delay.max(0.0) as f64,
            interval,
            owner,
            task,
            cancelled: false,
        });
        handle
    }

    /// Idempotent. Cancelling a repeating timer from within its own firing is
    /// safe: due tasks are collected before any of them run.
    pub fn cancel(&mut self, handle: TimerHandle) {
        for entry in &mut self.entries {
            if entry.handle == handle {
                entry.cancelled = true;
            }
        }
    }

    /// Drop every timer owned by `owner`. Called from kill paths.
    pub fn cancel_owned(&mut self, owner: Entity) {
        for entry in &mut self.entries {
            if entry.owner == Some(owner) {
                entry.cancelled = true;
            }
        }
    }

    /// Collect every task due at the current time. Repeating entries are
    /// rescheduled; one-shot entries are discarded. Entries whose owner fails
    /// the liveness check are discarded without firing.
    pub fn collect_due(&mut self, mut owner_alive: impl FnMut(Entity) -> bool) -> Vec<ScheduledTask> {
        let now = self.now;
        let mut due = Vec::new();
        self.entries.retain_mut(|entry| {
            if entry.cancelled {
                return false;
            }
            if entry.fire_at > now {
                return true;
            }
            if let Some(owner) = entry.owner {
                if !owner_alive(owner) {
                    return false;
                }
            }
            due.push(entry.task.clone());
            match entry.interval {
                Some(interval) => {
                    entry.fire_at = now + interval.max(f32::EPSILON) as f64;
                    true
                }
                None => false,
            }
        });
        due
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.entries.iter().filter(|e| !e.cancelled).count()
    }
}

fn tick_clock(
    time: Res<Time<Fixed>>,
    mut clock: ResMut<Clock>,
    mut events: ResMut<GameEventBus>,
    mut queue: ResMut<ScriptQueue>,
    alive_q: Query<&Alive>,
) {
    clock.advance(time.delta_secs());
    let due = clock.collect_due(|owner| alive_q.get(owner).map(|a| a.0).unwrap_or(false));
    for task in due {
        match task {
            ScheduledTask::Emit { name, data } => events.emit(name, data, None),
            ScheduledTask::Actions(actions) => queue.enqueue(actions),
        }
    }
}
