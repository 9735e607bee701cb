//! Core mosaic, aggregation and classification modules

pub mod clean_mask;
pub mod mosaic;
pub mod partition;
pub mod timeseries;
pub mod tsm;
pub mod wofs;

// Re-export main types
pub use clean_mask::{derive_clean_mask, derive_clean_mask_slice, derive_water_mask, QaCode};
pub use mosaic::{composite, CompositeAccumulator, MosaicStrategy};
pub use partition::{split_task, PartitionParams, TaskPartition, DEFAULT_RESOLUTION};
pub use timeseries::{merge_aggregate, AggregateAccumulator};
pub use tsm::{mask_tsm, tsm};
pub use wofs::{classify_water_from_qa, wofs_classify, Precision};
