use super::*;

struct ManagerImpl {
    events: EventDispatcher,
    defaults: SpaceDefaults,
    categories: RefCell<BTreeMap<String, SignalingCategory>>,
    disposed: Cell<bool>,
}

/// Root of the signaling namespace. Categories are created on first use and removed once their
/// last space goes away.
///
/// Events: "categoryAdded" and "categoryRemoved" (field "idCategory", the SignalingCategory
/// attached) and "dispose".
#[derive(Clone)]
pub struct SignalingManager(Rc<ManagerImpl>);

#[derive(Clone)]
pub(crate) struct WeakSignalingManager(Weak<ManagerImpl>);

impl WeakSignalingManager {
    pub fn upgrade(&self) -> Option<SignalingManager> {
        self.0.upgrade().map(SignalingManager)
    }
}

impl SignalingManager {
    pub fn new(defaults: SpaceDefaults) -> Self {
        Self(Rc::new(ManagerImpl {
            events: EventDispatcher::new(),
            defaults,
            categories: RefCell::new(BTreeMap::new()),
            disposed: Cell::new(false),
        }))
    }

    pub fn defaults(&self) -> &SpaceDefaults {
        &self.0.defaults
    }

    pub fn is_disposed(&self) -> bool {
        self.0.disposed.get()
    }

    pub fn category_ids(&self) -> Vec<String> {
        self.0.categories.borrow().keys().cloned().collect()
    }

    /// A blank id means the default category. Allocates a missing category when auto_alloc is
    /// set; the same id always gives the same category while it lives.
    pub fn category_get(&self, id_category: &str, auto_alloc: bool) -> Option<SignalingCategory> {
        if self.is_disposed() {
            return None;
        }
        let id_category = if id_category.is_empty() {
            self.0.defaults.category.as_str()
        } else {
            id_category
        };
        if let Some(category) = self.0.categories.borrow().get(id_category) {
            return Some(category.clone());
        }
        if !auto_alloc {
            return None;
        }
        let category = SignalingCategory::new(id_category, self);
        self.0
            .categories
            .borrow_mut()
            .insert(id_category.to_string(), category.clone());
        debug!("new signaling category {:?}", id_category);
        self.emit(
            Event::new("categoryAdded")
                .with("idCategory", id_category)
                .attach(category.clone()),
        );
        Some(category)
    }

    /// Disposes the category with everything in it
    pub fn category_remove(&self, id_category: &str) -> bool {
        let category = self.0.categories.borrow().get(id_category).cloned();
        match category {
            Some(category) => {
                category.dispose();
                true
            }
            None => false,
        }
    }

    pub(crate) fn downgrade(&self) -> WeakSignalingManager {
        WeakSignalingManager(Rc::downgrade(&self.0))
    }

    /// Called by a disposing category
    pub(crate) fn forget_category(&self, category: &SignalingCategory) {
        let removed = {
            let mut categories = self.0.categories.borrow_mut();
            match categories.get(category.id()) {
                Some(existing) if existing.ptr_eq(category) => {
                    categories.remove(category.id());
                    true
                }
                _ => false,
            }
        };
        if removed || self.is_disposed() {
            self.emit(
                Event::new("categoryRemoved")
                    .with("idCategory", category.id())
                    .attach(category.clone()),
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
        debug!("disposing signaling manager");
        let categories = std::mem::take(&mut *self.0.categories.borrow_mut());
        for category in categories.values() {
            category.dispose();
        }
        self.0.events.dispose();
    }
}

impl Default for SignalingManager {
    fn default() -> Self {
        Self::new(SpaceDefaults::default())
    }
}

impl EventSource for SignalingManager {
    fn dispatcher(&self) -> &EventDispatcher {
        &self.0.events
    }
}

impl Debug for SignalingManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SignalingManager {:?}", self.category_ids())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_allocated_once() {
        let manager = SignalingManager::default();
        let events = RecordedEvents::new(&manager, &["categoryAdded"]);
        let first = manager.category_get("games", true).unwrap();
        let second = manager.category_get("games", true).unwrap();
        assert!(first.ptr_eq(&second));
        events.assert_kinds(&["categoryAdded"]);
        assert_eq!(events.field(0, "idCategory"), json!("games"));
        assert_eq!(manager.category_ids(), vec!["games".to_string()]);
    }

    #[test]
    fn lookup_without_alloc_finds_nothing_new() {
        let manager = SignalingManager::default();
        assert!(manager.category_get("games", false).is_none());
        assert!(manager.category_ids().is_empty());
    }

    #[test]
    fn blank_id_means_default_category() {
        let manager = SignalingManager::default();
        let category = manager.category_get("", true).unwrap();
        assert_eq!(category.id(), DEFAULT_CATEGORY);
    }

    #[test]
    fn removing_a_category_reports_it() {
        let manager = SignalingManager::default();
        let events = RecordedEvents::new(&manager, &["categoryRemoved"]);
        let category = manager.category_get("games", true).unwrap();
        assert!(manager.category_remove("games"));
        assert!(!manager.category_remove("games"));
        assert!(category.is_disposed());
        events.assert_kinds(&["categoryRemoved"]);
        assert!(manager.category_ids().is_empty());
    }

    #[test]
    fn dispose_takes_down_the_whole_tree() {
        let manager = SignalingManager::default();
        let category = manager.category_get("games", true).unwrap();
        let space = category.space_get("lobby", true).unwrap();
        let events = RecordedEvents::new(&manager, &["categoryRemoved", "dispose"]);
        manager.dispose();
        manager.dispose();
        events.assert_kinds(&["categoryRemoved", "dispose"]);
        assert!(space.is_disposed());
        assert!(manager.category_get("games", true).is_none());
    }
}
