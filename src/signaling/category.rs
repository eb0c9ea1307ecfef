use super::*;

struct CategoryImpl {
    me: Weak<CategoryImpl>,
    id: String,
    default_space: String,
    manager: WeakSignalingManager,
    events: EventDispatcher,
    spaces: RefCell<BTreeMap<String, SignalingSpace>>,
    disposed: Cell<bool>,
}

/// A group of spaces. Events: "spaceAdded" and "spaceRemoved" (field "idSpace", the
/// SignalingSpace attached) and "dispose".
#[derive(Clone)]
pub struct SignalingCategory(Rc<CategoryImpl>);

#[derive(Clone)]
pub(crate) struct WeakSignalingCategory(Weak<CategoryImpl>);

impl WeakSignalingCategory {
    pub fn upgrade(&self) -> Option<SignalingCategory> {
        self.0.upgrade().map(SignalingCategory)
    }
}

impl SignalingCategory {
    pub(crate) fn new(id: &str, manager: &SignalingManager) -> Self {
        Self(Rc::new_cyclic(|me| CategoryImpl {
            me: me.clone(),
            id: id.to_string(),
            default_space: manager.defaults().space.clone(),
            manager: manager.downgrade(),
            events: EventDispatcher::new(),
            spaces: RefCell::new(BTreeMap::new()),
            disposed: Cell::new(false),
        }))
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn manager(&self) -> Option<SignalingManager> {
        self.0.manager.upgrade()
    }

    pub fn is_disposed(&self) -> bool {
        self.0.disposed.get()
    }

    pub fn ptr_eq(&self, other: &SignalingCategory) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn space_ids(&self) -> Vec<String> {
        self.0.spaces.borrow().keys().cloned().collect()
    }

    /// A blank id means the default space
    pub fn space_get(&self, id_space: &str, auto_alloc: bool) -> Option<SignalingSpace> {
        if self.is_disposed() {
            return None;
        }
        let id_space = if id_space.is_empty() {
            self.0.default_space.as_str()
        } else {
            id_space
        };
        if let Some(space) = self.0.spaces.borrow().get(id_space) {
            return Some(space.clone());
        }
        if !auto_alloc {
            return None;
        }
        let space = SignalingSpace::new(id_space, self);
        self.0
            .spaces
            .borrow_mut()
            .insert(id_space.to_string(), space.clone());
        debug!(
            "new signaling space {:?} in category {:?}",
            id_space, self.0.id
        );
        self.emit(
            Event::new("spaceAdded")
                .with("idSpace", id_space)
                .attach(space.clone()),
        );
        Some(space)
    }

    /// Disposes the space, then this category if it became empty
    pub fn space_remove(&self, id_space: &str) -> bool {
        if self.is_disposed() {
            return false;
        }
        let space = self.0.spaces.borrow().get(id_space).cloned();
        match space {
            Some(space) => {
                space.dispose();
                self.auto_dispose();
                true
            }
            None => false,
        }
    }

    /// The oldest offer of the first space that has one
    pub fn fetch_published_offer(&self) -> Option<OfferRecord> {
        if self.is_disposed() {
            return None;
        }
        let spaces: Vec<SignalingSpace> = self.0.spaces.borrow().values().cloned().collect();
        spaces.iter().find_map(|space| space.fetch_published_offer())
    }

    /// Disposes this category once it holds no spaces
    pub fn auto_dispose(&self) {
        if self.is_disposed() || !self.0.spaces.borrow().is_empty() {
            return;
        }
        trace!("auto-disposing signaling category {:?}", self.0.id);
        self.dispose();
    }

    pub(crate) fn downgrade(&self) -> WeakSignalingCategory {
        WeakSignalingCategory(self.0.me.clone())
    }

    pub(crate) fn forget_space(&self, space: &SignalingSpace) {
        let removed = {
            let mut spaces = self.0.spaces.borrow_mut();
            match spaces.get(space.id()) {
                Some(existing) if existing.ptr_eq(space) => {
                    spaces.remove(space.id());
                    true
                }
                _ => false,
            }
        };
        if removed || self.is_disposed() {
            self.emit(
                Event::new("spaceRemoved")
                    .with("idSpace", space.id())
                    .attach(space.clone()),
            );
        }
    }

    fn emit(&self, event: Event) {
        self.0.events.dispatch(&event);
    }

    pub fn dispose(&self) {
        if self.0.disposed.replace(true) {
            return;
        }
        debug!("disposing signaling category {:?}", self.0.id);
        let spaces = std::mem::take(&mut *self.0.spaces.borrow_mut());
        for space in spaces.values() {
            space.dispose();
        }
        if let Some(manager) = self.manager() {
            manager.forget_category(self);
        }
        self.0.events.dispose();
    }
}

impl EventSource for SignalingCategory {
    fn dispatcher(&self) -> &EventDispatcher {
        &self.0.events
    }
}

impl Debug for SignalingCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SignalingCategory {:?} {:?}", self.0.id, self.space_ids())
    }
}
