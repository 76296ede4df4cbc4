// ============================================================================
// Catalog Domain - Read-only menu data consumed by decomposition
// ============================================================================

pub mod value_objects;
pub mod lookup;

pub use value_objects::*;
pub use lookup::*;
