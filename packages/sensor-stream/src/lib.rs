pub mod averaging;
pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod experiment;
pub mod plot;
pub mod points;
pub mod queue;
pub mod registry;
pub mod sensor;
pub mod types;
pub mod writer;

pub use averaging::{AveragingState, EngineState, SensorAveragingEngine, SensorStats};
pub use buffer::{BufferMetrics, BufferSnapshot, SampleBuffer};
pub use config::{BufferConfig, ChannelOutputs, ExperimentConfig, PlotConfig, SensorConfig};
pub use error::{StreamError, StreamResult};
pub use events::{BufferEvent, ObserverId, UpdateFlag};
pub use experiment::{Experiment, ExperimentReport, ExperimentState};
pub use plot::{PlotRenderer, PlotSummary, PlotUpdate, PointMirror, StreamPlot};
pub use points::{Point, PointCollection, RenderPoint};
pub use queue::ConcurrentQueue;
pub use registry::{BufferHandle, BufferRegistry};
pub use sensor::{ScriptedSource, SensorInput, SensorSink, SensorSource, SimulatedSource};
pub use types::{Accuracy, Sample, SensorEvent, SensorKind};
pub use writer::{ChannelBindings, ChannelWriter};
