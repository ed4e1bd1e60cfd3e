pub mod pipeline;
pub mod use_case;

pub use pipeline::InferencePipeline;
pub use use_case::ClassifyImageUseCase;
