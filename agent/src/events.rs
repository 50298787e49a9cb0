//! Log event observers
//!
//! Passive listeners receive one [`LogEvent`] per completed frame. The
//! engine never depends on them.

use frameperf_shared::LogEvent;

pub type ListenerId = u64;

type Handler = Box<dyn FnMut(&LogEvent)>;

struct Listener {
    id: ListenerId,
    once: bool,
    handler: Handler,
}

#[derive(Default)]
pub struct LogEmitter {
    listeners: Vec<Listener>,
    next_id: ListenerId,
}

impl LogEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `handler` for every event until removed with [`LogEmitter::off`]
    pub fn on(&mut self, handler: impl FnMut(&LogEvent) + 'static) -> ListenerId {
        self.add(handler, false)
    }

    /// Call `handler` for the next event only
    pub fn once(&mut self, handler: impl FnMut(&LogEvent) + 'static) -> ListenerId {
        self.add(handler, true)
    }

    fn add(&mut self, handler: impl FnMut(&LogEvent) + 'static, once: bool) -> ListenerId {
        self.next_id += 1;
        self.listeners.push(Listener {
            id: self.next_id,
            once,
            handler: Box::new(handler),
        });
        self.next_id
    }

    /// Returns false when `id` is not registered
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    pub fn emit(&mut self, event: &LogEvent) {
        for listener in self.listeners.iter_mut() {
            (listener.handler)(event);
        }
        self.listeners.retain(|l| !l.once);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn event(fps: f64) -> LogEvent {
        let mut event = LogEvent::default();
        event.sample.fps = fps;
        event
    }

    #[test]
    fn test_on_once_off() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut emitter = LogEmitter::new();

        let all = {
            let seen = seen.clone();
            emitter.on(move |e| seen.borrow_mut().push(("on", e.sample.fps)))
        };
        {
            let seen = seen.clone();
            emitter.once(move |e| seen.borrow_mut().push(("once", e.sample.fps)));
        }
        assert_eq!(emitter.len(), 2);

        emitter.emit(&event(30.0));
        emitter.emit(&event(60.0));
        assert!(emitter.off(all));
        assert!(!emitter.off(all));
        emitter.emit(&event(90.0));

        assert_eq!(
            *seen.borrow(),
            vec![("on", 30.0), ("once", 30.0), ("on", 60.0)]
        );
        assert!(emitter.is_empty());
    }
}
