pub mod container;
pub mod registry;

pub use container::{
    ContainerHeader, ContainerReader, ContainerWriter, FileContainerWriter, RecordedContainer,
    SampleRecord, TrackSummary, CONTAINER_EXTENSION,
};
pub use registry::{FinishedContainer, MuxerStats, MuxerTrackRegistry};
