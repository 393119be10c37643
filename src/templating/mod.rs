// ============================================================================
// spark-observe - Templating
// Views, view factories and the composition coordinator
// ============================================================================

pub mod composition;
pub mod factory;
pub mod view;

pub use composition::{Composable, CompositionCoordinator};
pub use factory::{ViewFactory, ViewTemplate};
pub use view::{NodeSequence, View, ViewParts};
