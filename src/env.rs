//! Environment & frame.
//!
//! A frame is a flat name→value table; an environment is a frame plus an
//! optional parent, forming the lexical scope chain a closure captures.
//! Every [`Environment`] is created through an [`EnvironmentManager`], which
//! keeps a weak reference to each one so it can break the
//! `Value -> Closure -> Environment -> ... -> Environment` reference cycles a
//! tracing-GC-free host would otherwise leak.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::error::RunError;
use crate::resource::Limits;
use crate::value::Value;

/// A flat name→value table, local to one environment.
#[derive(Debug, Default)]
pub struct Frame {
    vars: AHashMap<String, Value>,
}

impl Frame {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Binds `name` to `value`, returning `true` if the name was previously
    /// unbound in this frame. The interpreter uses a `false` return to raise
    /// a duplicate-argument syntax error at closure entry.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> bool {
        self.vars.insert(name.into(), value).is_none()
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }
}

/// One node in the lexical scope chain.
///
/// Reachable only through an `Rc<RefCell<_>>` handed out by
/// [`EnvironmentManager`] — there is no public constructor, matching the
/// original's private-constructor-plus-friend-class design.
#[derive(Debug)]
pub struct Environment {
    parent: Option<Rc<RefCell<Environment>>>,
    frame: Frame,
}

impl Environment {
    /// Looks up `name`, walking the parent chain ("absence in the
    /// innermost frame means checking the next frame out").
    pub fn get(&self, name: &str) -> Result<Value, RunError> {
        if let Some(v) = self.frame.get(name) {
            return Ok(v.clone());
        }
        match &self.parent {
            Some(parent) => parent.borrow().get(name),
            None => Err(RunError::name(format!("name '{name}' is not defined"))),
        }
    }

    /// Binds `name` in this environment's own frame, never a parent's.
    /// Returns `true` if the name was previously unbound here.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> bool {
        self.frame.set(name, value)
    }

    /// Severs the parent link and empties this frame in place, breaking any
    /// cycle this environment participates in without waiting for every
    /// strong reference to it to drop.
    pub fn clear_frame(&mut self) {
        self.parent = None;
        self.frame.clear();
    }

    fn depth(&self) -> usize {
        1 + self.parent.as_ref().map_or(0, |p| p.borrow().depth())
    }
}

/// Owns every [`Environment`] created during one interpreter run, via weak
/// references, so it can drop them all at once.
#[derive(Debug, Default)]
pub struct EnvironmentManager {
    weak_envs: Vec<Weak<RefCell<Environment>>>,
}

impl EnvironmentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh child environment under `parent`, enforcing the
    /// recursion-depth ceiling so unbounded closure nesting fails as a typed
    /// error instead of exhausting the host stack.
    pub fn new_child(
        &mut self,
        parent: Option<Rc<RefCell<Environment>>>,
        limits: &Limits,
    ) -> Result<Rc<RefCell<Environment>>, RunError> {
        let depth = parent.as_ref().map_or(0, |p| p.borrow().depth()) + 1;
        limits.check_recursion_depth(depth)?;
        let env = Rc::new(RefCell::new(Environment { parent, frame: Frame::default() }));
        self.weak_envs.push(Rc::downgrade(&env));
        Ok(env)
    }

    /// Creates the root environment, pre-populated with `frame` (the built-in
    /// bindings).
    pub fn new_init_env(&mut self, frame: Frame) -> Rc<RefCell<Environment>> {
        let env = Rc::new(RefCell::new(Environment { parent: None, frame }));
        self.weak_envs.push(Rc::downgrade(&env));
        env
    }

    /// Clears every environment this manager has ever handed out, breaking
    /// all closure/environment cycles at once. Called when an interpreter run
    /// completes.
    pub fn clear_all(&mut self) {
        for weak in self.weak_envs.drain(..) {
            if let Some(env) = weak.upgrade() {
                env.borrow_mut().clear_frame();
            }
        }
    }
}

impl Drop for EnvironmentManager {
    fn drop(&mut self) {
        self.clear_all();
    }
}
