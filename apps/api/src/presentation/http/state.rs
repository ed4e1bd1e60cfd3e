use crate::{application::classify_image::ClassifyImageUseCase, config::Config};
use std::sync::Arc;

/// Built once at startup and cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub classify: ClassifyImageUseCase,
    pub config: Arc<Config>,
}
