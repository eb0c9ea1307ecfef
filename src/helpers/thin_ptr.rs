use std::rc::{Rc, Weak};

pub trait ThinPtr {
    fn thin_ptr(&self) -> *const ();
}

/// Rc::ptr_eq() compares vtables too for trait objects. See
/// https://github.com/rust-lang/rust/issues/46139. Use this instead
impl<T: ?Sized> ThinPtr for Rc<T> {
    fn thin_ptr(&self) -> *const () {
        Rc::as_ptr(self) as *const ()
    }
}

/// Same as for Rc, but a dead Weak is always null
impl<T: ?Sized> ThinPtr for Weak<T> {
    fn thin_ptr(&self) -> *const () {
        match self.upgrade() {
            Some(rc) => rc.thin_ptr(),
            None => std::ptr::null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Display;

    #[test]
    #[allow(clippy::redundant_clone)]
    fn returns_same_for_weak_clones() {
        let rc = Rc::new(7);
        let a = Rc::downgrade(&rc.clone());
        let b = Rc::downgrade(&rc);
        assert_eq!(a.thin_ptr(), b.thin_ptr());
    }

    #[test]
    fn returns_same_for_rc_and_weak() {
        let rc = Rc::new(7);
        let weak = Rc::downgrade(&rc);
        assert_eq!(rc.thin_ptr(), weak.thin_ptr());
    }

    #[test]
    fn returns_same_for_trait_object_and_concrete() {
        let rc = Rc::new(7);
        let dyn_rc: Rc<dyn Display> = rc.clone();
        assert_eq!(rc.thin_ptr(), dyn_rc.thin_ptr());
    }

    #[test]
    fn returns_different_for_different_objects() {
        let a = Rc::new(7);
        let b = Rc::new(7);
        assert_ne!(a.thin_ptr(), b.thin_ptr());
    }

    #[test]
    fn returns_null_for_empty_weak() {
        let weak;
        {
            let rc = Rc::new(7);
            weak = Rc::downgrade(&rc);
        }
        assert!(weak.upgrade().is_none());
        assert_eq!(weak.thin_ptr(), std::ptr::null());
    }
}
