// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each domain area has its own subdirectory. The order aggregate holds:
// - Value objects and the unit arena
// - Events, commands, errors
// - Decomposition, status derivation and financial recomputation
// - Aggregate implementation, command handler and service facade
//
// This layer is separate from the event sourcing infrastructure.
//
// ============================================================================

pub mod catalog;
pub mod order;
