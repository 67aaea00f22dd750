//! Listener registry and two-phase delivery.

use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Signal payload carried through an [`EventTarget`].
///
/// `Kind` is the subscription key; listeners only see signals whose kind
/// matches the one they registered for.
pub trait Signal {
    type Kind: Copy + Eq + Debug;

    fn kind(&self) -> Self::Kind;
}

/// Handle returned by listener registration, used to detach it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Delivery phase of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Runs before the default action; may prevent it when preventable.
    On,
    /// Runs after the default action has been committed.
    After,
}

/// Outcome of the intent phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Prevented,
}

/// Mutable view of one in-flight signal handed to every listener.
pub struct EventFacade<E> {
    event: E,
    preventable: bool,
    prevented: bool,
}

impl<E> EventFacade<E> {
    /// Wraps a signal. Only preventable facades honor `prevent_default`.
    pub fn new(event: E, preventable: bool) -> Self {
        Self {
            event,
            preventable,
            prevented: false,
        }
    }

    pub fn event(&self) -> &E {
        &self.event
    }

    pub fn into_event(self) -> E {
        self.event
    }

    /// Cancels the default action. Ignored for non-preventable signals.
    pub fn prevent_default(&mut self) {
        if self.preventable {
            self.prevented = true;
        }
    }

    pub fn is_prevented(&self) -> bool {
        self.prevented
    }

    pub fn is_preventable(&self) -> bool {
        self.preventable
    }
}

impl<E: Debug> Debug for EventFacade<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFacade")
            .field("event", &self.event)
            .field("preventable", &self.preventable)
            .field("prevented", &self.prevented)
            .finish()
    }
}

type Handler<E> = Rc<dyn Fn(&mut EventFacade<E>)>;

struct Listener<E: Signal> {
    id: ListenerId,
    kind: E::Kind,
    phase: Phase,
    once: bool,
    handler: Handler<E>,
}

/// Publish/subscribe channel owned by one emitting object.
pub struct EventTarget<E: Signal> {
    listeners: RefCell<Vec<Listener<E>>>,
    next_id: Cell<u64>,
}

impl<E: Signal> Default for EventTarget<E> {
    fn default() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }
}

impl<E: Signal> Debug for EventTarget<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTarget")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

impl<E: Signal> EventTarget<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an intent-phase listener.
    pub fn on(&self, kind: E::Kind, handler: impl Fn(&mut EventFacade<E>) + 'static) -> ListenerId {
        self.register(kind, Phase::On, false, Rc::new(handler))
    }

    /// Registers an effect-phase listener. It never sees prevented signals.
    pub fn after(
        &self,
        kind: E::Kind,
        handler: impl Fn(&mut EventFacade<E>) + 'static,
    ) -> ListenerId {
        self.register(kind, Phase::After, false, Rc::new(handler))
    }

    /// Registers an intent-phase listener that detaches after one delivery.
    pub fn once(
        &self,
        kind: E::Kind,
        handler: impl Fn(&mut EventFacade<E>) + 'static,
    ) -> ListenerId {
        self.register(kind, Phase::On, true, Rc::new(handler))
    }

    /// Detaches one listener. Returns `false` when the id is unknown.
    pub fn detach(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        listeners.len() != before
    }

    pub fn detach_all(&self) {
        self.listeners.borrow_mut().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Runs intent-phase listeners and reports whether the action may proceed.
    pub fn intent(&self, facade: &mut EventFacade<E>) -> Decision {
        self.deliver(Phase::On, facade);
        if facade.is_prevented() {
            Decision::Prevented
        } else {
            Decision::Proceed
        }
    }

    /// Runs effect-phase listeners for an already committed action.
    pub fn effect(&self, facade: &mut EventFacade<E>) {
        if !facade.is_prevented() {
            self.deliver(Phase::After, facade);
        }
    }

    /// Emits a non-preventable signal through both phases.
    pub fn notify(&self, event: E) {
        let mut facade = EventFacade::new(event, false);
        self.deliver(Phase::On, &mut facade);
        self.deliver(Phase::After, &mut facade);
    }

    fn register(&self, kind: E::Kind, phase: Phase, once: bool, handler: Handler<E>) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push(Listener {
            id,
            kind,
            phase,
            once,
            handler,
        });
        id
    }

    fn deliver(&self, phase: Phase, facade: &mut EventFacade<E>) {
        let kind = facade.event().kind();
        // Snapshot first: listeners registered or detached during this round
        // take effect from the next delivery.
        let handlers: Vec<Handler<E>> = {
            let mut listeners = self.listeners.borrow_mut();
            let matched = listeners
                .iter()
                .filter(|listener| listener.phase == phase && listener.kind == kind)
                .map(|listener| Rc::clone(&listener.handler))
                .collect();
            listeners.retain(|listener| !(listener.once && listener.phase == phase && listener.kind == kind));
            matched
        };

        for handler in handlers {
            handler(facade);
        }
    }
}
