// ============================================================================
// spark-observe - View Factory
// Named view producer with a bounded cache of released views
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::view::{View, ViewParts};
use crate::config::{RuntimeConfig, ViewCacheSize};
use crate::core::constants::NONE;
use crate::core::error::{Error, Result};
use crate::lifecycle::Lifecycle;

/// Produces the parts of a fresh view.
pub trait ViewTemplate {
    fn render(&self, lifecycle: &Rc<Lifecycle>) -> Result<ViewParts>;
}

/// Creates views from a template, reusing released ones when it can.
pub struct ViewFactory {
    self_weak: Weak<ViewFactory>,
    name: Rc<str>,
    lifecycle: Rc<Lifecycle>,
    template: Rc<dyn ViewTemplate>,
    /// `None` until a size is configured
    cache_size: Cell<Option<usize>>,
    cache: RefCell<Vec<Rc<View>>>,
}

impl ViewFactory {
    pub fn new(
        name: &str,
        lifecycle: Rc<Lifecycle>,
        template: Rc<dyn ViewTemplate>,
        config: &RuntimeConfig,
    ) -> Result<Rc<Self>> {
        if name.is_empty() {
            return Err(Error::UnnamedViewFactory);
        }
        let factory = Rc::new_cyclic(|self_weak| Self {
            self_weak: self_weak.clone(),
            name: Rc::from(name),
            lifecycle,
            template,
            cache_size: Cell::new(None),
            cache: RefCell::new(Vec::new()),
        });
        factory.set_cache_size(config.view_cache_size, true);
        Ok(factory)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_caching(&self) -> bool {
        self.cache_size.get().is_some_and(|size| size > 0)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Configure the cache capacity. With `do_not_override_if_already_set`
    /// an earlier explicit size wins. A zero size disables caching and drops
    /// whatever is cached.
    pub fn set_cache_size(&self, size: Option<ViewCacheSize>, do_not_override_if_already_set: bool) {
        if let Some(size) = size {
            if self.cache_size.get().is_none() || !do_not_override_if_already_set {
                self.cache_size.set(Some(size.capacity()));
            }
        }
        let capacity = self.cache_size.get().unwrap_or(0);
        self.cache.borrow_mut().truncate(capacity);
    }

    /// Whether a released view would find room in the cache.
    pub fn can_return_to_cache(&self) -> bool {
        self.is_caching() && self.cache.borrow().len() < self.cache_size.get().unwrap_or(0)
    }

    /// Put `view` in the cache if there is room.
    pub fn try_return_to_cache(&self, view: &Rc<View>) -> bool {
        if !self.can_return_to_cache() {
            return false;
        }
        view.cache(NONE);
        self.cache.borrow_mut().push(view.clone());
        tracing::trace!(factory = %self.name, cached = self.cached_count(), "view returned to cache");
        true
    }

    /// A cached view if one is available, otherwise a freshly rendered one.
    pub fn create(&self) -> Result<Rc<View>> {
        let cached = self.cache.borrow_mut().pop();
        if let Some(view) = cached {
            view.take_from_cache();
            return Ok(view);
        }
        let parts = self.template.render(&self.lifecycle)?;
        Ok(View::build(self.lifecycle.clone(), Some(self.self_weak.clone()), parts))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleNode;
    use crate::templating::view::NodeSequence;

    struct NoNodes;

    impl NodeSequence for NoNodes {
        fn mount(&self) {}
        fn unmount(&self) {}
    }

    struct Empty;

    impl ViewTemplate for Empty {
        fn render(&self, _lifecycle: &Rc<Lifecycle>) -> Result<ViewParts> {
            Ok(ViewParts {
                nodes: Rc::new(NoNodes),
                bindings: Vec::new(),
            })
        }
    }

    fn factory(size: Option<ViewCacheSize>) -> Rc<ViewFactory> {
        let config = RuntimeConfig {
            view_cache_size: size,
            ..Default::default()
        };
        ViewFactory::new("item", Lifecycle::new(), Rc::new(Empty), &config).unwrap()
    }

    #[test]
    fn unnamed_factory_is_rejected() {
        let result = ViewFactory::new("", Lifecycle::new(), Rc::new(Empty), &RuntimeConfig::default());
        assert_eq!(result.err().map(|e| e.to_string()), Some(Error::UnnamedViewFactory.to_string()));
    }

    #[test]
    fn cache_is_bounded() {
        let factory = factory(Some(ViewCacheSize::Fixed(1)));
        let a = factory.create().unwrap();
        let b = factory.create().unwrap();
        assert!(factory.try_return_to_cache(&a));
        assert!(a.is_cached());
        assert!(!factory.can_return_to_cache());
        assert!(!factory.try_return_to_cache(&b));

        let reused = factory.create().unwrap();
        assert!(Rc::ptr_eq(&reused, &a));
        assert!(!reused.is_cached());
        assert_eq!(factory.cached_count(), 0);
    }

    #[test]
    fn zero_or_unset_disables_caching() {
        let unset = factory(None);
        assert!(!unset.is_caching());
        let view = unset.create().unwrap();
        assert!(!unset.try_return_to_cache(&view));

        let zero = factory(Some(ViewCacheSize::Fixed(0)));
        assert!(!zero.is_caching());
    }

    #[test]
    fn explicit_size_survives_defaults() {
        let factory = factory(None);
        factory.set_cache_size(Some("*".parse().unwrap()), false);
        factory.set_cache_size(Some(ViewCacheSize::Fixed(1)), true);
        assert!(factory.is_caching());
        let views: Vec<_> = (0..3).map(|_| factory.create().unwrap()).collect();
        for view in &views {
            assert!(factory.try_return_to_cache(view));
        }
        assert_eq!(factory.cached_count(), 3);

        factory.set_cache_size(Some(ViewCacheSize::Fixed(0)), false);
        assert!(!factory.is_caching());
        assert_eq!(factory.cached_count(), 0);
    }

    #[test]
    fn released_view_returns_on_unmount() {
        let factory = factory(Some(ViewCacheSize::Fixed(2)));
        let view = factory.create().unwrap();
        view.attach(NONE);
        assert!(view.release(NONE));
        view.detach(NONE);
        assert!(view.is_cached());
        assert_eq!(factory.cached_count(), 1);
        assert!(!LifecycleNode::unmount(view.as_ref(), NONE));
    }
}
