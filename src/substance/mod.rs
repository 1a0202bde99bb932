//! Substances: the shapes the renderer draws, each tied to a rigid body

pub mod substance_data;
pub mod substance_operations;

pub use substance_data::{Substance, SubstanceId, SubstanceRecord};
pub use substance_operations::create_substance_record;
