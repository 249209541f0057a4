use crate::runtime::value::Value;
use std::collections::HashMap;

pub type Frame = HashMap<String, Value>;

/// Call-frame stack plus the global bindings used when no call is active.
#[derive(Debug, Default)]
pub struct Environment {
    frames: Vec<Frame>,
    globals: Frame,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Frame::new());
        tracing::trace!(depth = self.frames.len(), "push frame");
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        let frame = self.frames.pop();
        tracing::trace!(depth = self.frames.len(), "pop frame");
        frame
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Detaches the whole call stack, leaving only the globals visible.
    pub fn suspend_frames(&mut self) -> Vec<Frame> {
        tracing::trace!(depth = self.frames.len(), "suspend frames");
        std::mem::take(&mut self.frames)
    }

    /// Reinstates a stack taken by `suspend_frames`, dropping whatever
    /// frames were pushed in between.
    pub fn restore_frames(&mut self, frames: Vec<Frame>) {
        self.frames = frames;
        tracing::trace!(depth = self.frames.len(), "restore frames");
    }

    /// Binds into the current frame, or the globals when no frame is active.
    pub fn bind(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) => frame.insert(name.to_string(), value),
            None => self.globals.insert(name.to_string(), value),
        };
    }

    /// Innermost frame first, then globals.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
            .or_else(|| self.globals.get(name))
    }

    /// Rebinds an existing binding in place, searching like `lookup`. Hands
    /// the value back when no binding exists.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), Value> {
        let slot = self
            .frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.get_mut(name))
            .or_else(|| self.globals.get_mut(name));
        match slot {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_to_globals_without_a_frame() {
        let mut env = Environment::new();
        env.bind("g", Value::Int(1));
        assert_eq!(env.depth(), 0);
        assert_eq!(env.lookup("g").and_then(|v| v.as_int().ok()), Some(1));
    }

    #[test]
    fn innermost_frame_shadows_for_its_lifetime() {
        let mut env = Environment::new();
        env.bind("a", Value::Int(1));
        env.push_frame();
        env.bind("a", Value::Int(2));
        env.push_frame();
        assert_eq!(env.lookup("a").and_then(|v| v.as_int().ok()), Some(2));
        env.bind("a", Value::Int(3));
        assert_eq!(env.lookup("a").and_then(|v| v.as_int().ok()), Some(3));
        env.pop_frame();
        assert_eq!(env.lookup("a").and_then(|v| v.as_int().ok()), Some(2));
        env.pop_frame();
        assert_eq!(env.lookup("a").and_then(|v| v.as_int().ok()), Some(1));
        assert!(env.lookup("missing").is_none());
    }

    #[test]
    fn assign_rebinds_innermost_existing_binding() {
        let mut env = Environment::new();
        env.bind("g", Value::Int(0));
        env.push_frame();
        env.bind("local", Value::Int(1));
        env.push_frame();

        assert!(env.assign("local", Value::Int(10)).is_ok());
        assert!(env.assign("g", Value::Int(20)).is_ok());
        let rejected = env.assign("nowhere", Value::Int(30)).unwrap_err();
        assert_eq!(rejected.as_int(), Ok(30));

        env.pop_frame();
        assert_eq!(env.lookup("local").and_then(|v| v.as_int().ok()), Some(10));
        env.pop_frame();
        assert_eq!(env.lookup("g").and_then(|v| v.as_int().ok()), Some(20));
        assert!(env.lookup("local").is_none());
    }

    #[test]
    fn suspended_frames_are_hidden_until_restored() {
        let mut env = Environment::new();
        env.bind("g", Value::Int(1));
        env.push_frame();
        env.bind("local", Value::Int(2));

        let frames = env.suspend_frames();
        assert_eq!(env.depth(), 0);
        assert!(env.lookup("local").is_none());
        assert_eq!(env.lookup("g").and_then(|v| v.as_int().ok()), Some(1));
        env.push_frame();

        env.restore_frames(frames);
        assert_eq!(env.depth(), 1);
        assert_eq!(env.lookup("local").and_then(|v| v.as_int().ok()), Some(2));
    }

    #[test]
    fn popping_an_empty_stack_is_harmless() {
        let mut env = Environment::new();
        assert!(env.pop_frame().is_none());
        assert_eq!(env.depth(), 0);
    }
}
