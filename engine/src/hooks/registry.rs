use std::collections::HashMap;

use log::trace;

use super::{Point, Priority};
use crate::{
    error::{Result, TrainErr},
    pipe::{Pipe, Stateful},
    state::RunState,
};

/// Handle to a pipe attached to a [`HookRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipeId(usize);

#[derive(Debug, Clone, Copy)]
struct Slot {
    pipe: PipeId,
    priority: Priority,
}

/// The dispatch table: for each point, the pipes to call in order.
///
/// Slots are kept sorted by priority at registration time. A new slot goes
/// after every slot of equal priority, so ties fire in registration order.
#[derive(Default)]
pub struct HookRegistry {
    pipes: Vec<Box<dyn Pipe>>,
    table: HashMap<Point, Vec<Slot>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `pipe` and registers every hook it declares.
    ///
    /// # Errors
    /// `TrainErr::Configuration` if a pipe with the same name is already attached
    /// or the pipe declares the same point twice.
    pub fn attach(&mut self, pipe: Box<dyn Pipe>) -> Result<PipeId> {
        if self.find(pipe.name()).is_some() {
            return Err(TrainErr::Configuration(format!(
                "a pipe named `{}` is already attached",
                pipe.name()
            )));
        }

        let id = PipeId(self.pipes.len());
        let hooks = pipe.hooks();
        self.pipes.push(pipe);

        for (point, priority) in hooks {
            if let Err(e) = self.register(id, point, priority) {
                self.detach_last();
                return Err(e);
            }
        }

        Ok(id)
    }

    /// Registers `pipe` for `point`.
    ///
    /// # Errors
    /// `TrainErr::Configuration` if the pipe is unknown or already registered
    /// for `point`. Use [`HookRegistry::register_override`] to move an existing
    /// registration.
    pub fn register(&mut self, pipe: PipeId, point: Point, priority: Priority) -> Result<()> {
        let name = self.name_of(pipe)?.to_string();
        let slots = self.table.entry(point).or_default();

        if slots.iter().any(|slot| slot.pipe == pipe) {
            return Err(TrainErr::Configuration(format!(
                "pipe `{name}` is already registered for {point}"
            )));
        }

        Self::insert(slots, Slot { pipe, priority });
        trace!(priority = priority; "registered `{name}` for {point}");
        Ok(())
    }

    /// Registers `pipe` for `point`, replacing its previous priority if any.
    /// The moved slot goes after the slots already holding the new priority.
    pub fn register_override(
        &mut self,
        pipe: PipeId,
        point: Point,
        priority: Priority,
    ) -> Result<()> {
        self.name_of(pipe)?;

        let slots = self.table.entry(point).or_default();
        slots.retain(|slot| slot.pipe != pipe);
        Self::insert(slots, Slot { pipe, priority });
        Ok(())
    }

    /// Invokes every pipe registered for `point` in order.
    ///
    /// # Errors
    /// The first pipe failure stops the dispatch, the pipes after it don't run.
    /// The failure comes back as `TrainErr::Extension` carrying the pipe's own error.
    pub fn dispatch(&mut self, point: Point, state: &mut RunState) -> Result<()> {
        let Some(slots) = self.table.get(&point) else {
            return Ok(());
        };

        for slot in slots {
            let pipe = &mut self.pipes[slot.pipe.0];
            trace!(iteration = state.iteration; "{point} -> `{}`", pipe.name());

            if let Err(source) = point.invoke(pipe.as_mut(), state) {
                return Err(TrainErr::Extension {
                    pipe: pipe.name().to_string(),
                    point,
                    source,
                });
            }
        }

        Ok(())
    }

    /// The names of the pipes registered for `point`, in dispatch order.
    pub fn order(&self, point: Point) -> Vec<&str> {
        self.table
            .get(&point)
            .map(|slots| {
                slots
                    .iter()
                    .map(|slot| self.pipes[slot.pipe.0].name())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn find(&self, name: &str) -> Option<PipeId> {
        self.pipes
            .iter()
            .position(|pipe| pipe.name() == name)
            .map(PipeId)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pipes.iter().map(|pipe| pipe.name())
    }

    /// The attached pipes that opted into checkpointing, in attach order.
    pub fn stateful(&mut self) -> impl Iterator<Item = (String, &mut dyn Stateful)> {
        self.pipes.iter_mut().filter_map(|pipe| {
            let name = pipe.name().to_string();
            pipe.stateful().map(|state| (name, state))
        })
    }

    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }

    fn name_of(&self, pipe: PipeId) -> Result<&str> {
        self.pipes
            .get(pipe.0)
            .map(|pipe| pipe.name())
            .ok_or_else(|| TrainErr::Configuration(format!("unknown pipe id {}", pipe.0)))
    }

    fn insert(slots: &mut Vec<Slot>, slot: Slot) {
        let at = slots.partition_point(|other| other.priority <= slot.priority);
        slots.insert(at, slot);
    }

    /// Undoes a partially registered attach.
    fn detach_last(&mut self) {
        let Some(last) = self.pipes.len().checked_sub(1).map(PipeId) else {
            return;
        };

        for slots in self.table.values_mut() {
            slots.retain(|slot| slot.pipe != last);
        }

        self.pipes.pop();
    }
}
