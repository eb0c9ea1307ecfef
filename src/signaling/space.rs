use super::*;

struct SpaceImpl {
    me: Weak<SpaceImpl>,
    id: String,
    id_category: String,
    category: WeakSignalingCategory,
    events: EventDispatcher,
    clients: RefCell<BTreeMap<String, SignalingClient>>,
    offers: RefCell<VecDeque<OfferRecord>>,
    /// Empty while the space has no creator
    id_somebody_creator: RefCell<String>,
    disposed: Cell<bool>,
}

/// One rendezvous group: at most one creator, any number of joiners, and the queue of offers
/// the creator published.
///
/// Events: "clientAdded" and "clientRemoved" (field "idRtcParticipant", the SignalingClient
/// attached) and "dispose".
#[derive(Clone)]
pub struct SignalingSpace(Rc<SpaceImpl>);

#[derive(Clone)]
pub(crate) struct WeakSignalingSpace(Weak<SpaceImpl>);

impl WeakSignalingSpace {
    pub fn upgrade(&self) -> Option<SignalingSpace> {
        self.0.upgrade().map(SignalingSpace)
    }
}

impl SignalingSpace {
    pub(crate) fn new(id: &str, category: &SignalingCategory) -> Self {
        Self(Rc::new_cyclic(|me| SpaceImpl {
            me: me.clone(),
            id: id.to_string(),
            id_category: category.id().to_string(),
            category: category.downgrade(),
            events: EventDispatcher::new(),
            clients: RefCell::new(BTreeMap::new()),
            offers: RefCell::new(VecDeque::new()),
            id_somebody_creator: RefCell::new(String::new()),
            disposed: Cell::new(false),
        }))
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn id_category(&self) -> &str {
        &self.0.id_category
    }

    pub fn category(&self) -> Option<SignalingCategory> {
        self.0.category.upgrade()
    }

    pub fn is_disposed(&self) -> bool {
        self.0.disposed.get()
    }

    pub fn ptr_eq(&self, other: &SignalingSpace) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn creator_id(&self) -> String {
        self.0.id_somebody_creator.borrow().clone()
    }

    pub(crate) fn set_creator_id(&self, id: &str) {
        *self.0.id_somebody_creator.borrow_mut() = id.to_string();
    }

    pub fn client_ids(&self) -> Vec<String> {
        if self.is_disposed() {
            return Vec::new();
        }
        self.0.clients.borrow().keys().cloned().collect()
    }

    pub fn client_get(&self, id_rtc_participant: &str) -> Option<SignalingClient> {
        if self.is_disposed() {
            return None;
        }
        self.0.clients.borrow().get(id_rtc_participant).cloned()
    }

    /// Disposes the client, then this space if it became empty
    pub fn client_remove(&self, id_rtc_participant: &str) -> bool {
        let client = match self.client_get(id_rtc_participant) {
            Some(client) => client,
            None => return false,
        };
        client.dispose();
        self.auto_dispose();
        true
    }

    pub fn pending_offer_count(&self) -> usize {
        self.0.offers.borrow().len()
    }

    pub(crate) fn publish_offer(&self, offer: Value, id_offer: u64) {
        self.0.offers.borrow_mut().push_back(OfferRecord {
            offer,
            id_offer,
            id_somebody_creator: String::new(),
        });
    }

    /// Pops the oldest offer and stamps it with the current creator. Nothing while the space
    /// has no creator.
    pub fn fetch_published_offer(&self) -> Option<OfferRecord> {
        if self.is_disposed() {
            trace!("fetching offer in disposed signaling space {:?}", self.0.id);
            return None;
        }
        let creator = self.creator_id();
        if creator.is_empty() {
            trace!("fetching offer in signaling space {:?} without creator", self.0.id);
            return None;
        }
        let mut record = self.0.offers.borrow_mut().pop_front()?;
        record.id_somebody_creator = creator;
        Some(record)
    }

    /// Disposes this space once it holds no clients
    pub fn auto_dispose(&self) {
        if self.is_disposed() || !self.0.clients.borrow().is_empty() {
            return;
        }
        trace!("auto-disposing signaling space {:?}", self.0.id);
        self.dispose();
    }

    pub(crate) fn downgrade(&self) -> WeakSignalingSpace {
        WeakSignalingSpace(self.0.me.clone())
    }

    pub(crate) fn add_client(&self, client: &SignalingClient) {
        if client.role() == Role::Creator {
            self.set_creator_id(client.id());
        }
        self.0
            .clients
            .borrow_mut()
            .insert(client.id().to_string(), client.clone());
        self.emit(
            Event::new("clientAdded")
                .with("idRtcParticipant", client.id())
                .attach(client.clone()),
        );
    }

    /// Called by a disposing client. Offers the departing creator published stay queued: offers
    /// are stamped with whoever is creator when they are fetched, so a creator rejoining under a
    /// new id picks up the leftovers.
    pub(crate) fn forget_client(&self, client: &SignalingClient) {
        let removed = {
            let mut clients = self.0.clients.borrow_mut();
            match clients.get(client.id()) {
                Some(existing) if existing.ptr_eq(client) => {
                    clients.remove(client.id());
                    true
                }
                _ => false,
            }
        };
        if client.role() == Role::Creator && *self.0.id_somebody_creator.borrow() == client.id() {
            self.set_creator_id("");
        }
        if removed || self.is_disposed() {
            self.emit(
                Event::new("clientRemoved")
                    .with("idRtcParticipant", client.id())
                    .attach(client.clone()),
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
        debug!(
            "disposing signaling space {:?} in category {:?}",
            self.0.id, self.0.id_category
        );
        let clients = std::mem::take(&mut *self.0.clients.borrow_mut());
        for client in clients.values() {
            client.dispose();
        }
        self.0.offers.borrow_mut().clear();
        if let Some(category) = self.category() {
            category.forget_space(self);
            category.auto_dispose();
        }
        self.0.events.dispose();
    }
}

impl EventSource for SignalingSpace {
    fn dispatcher(&self) -> &EventDispatcher {
        &self.0.events
    }
}

impl Debug for SignalingSpace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SignalingSpace {:?}/{:?} (creator {:?}, {} offers, clients {:?})",
            self.0.id_category,
            self.0.id,
            self.creator_id(),
            self.pending_offer_count(),
            self.client_ids()
        )
    }
}
