pub mod etl;
pub mod sequence;

pub use crate::domain::model::{Record, Table, TransformResult};
pub use crate::domain::ports::{Pipeline, Storage};
pub use crate::utils::error::Result;
pub use etl::{EtlEngine, StageReport};
pub use sequence::{Stage, StageKind, StageSequence};
