use std::sync::Arc;

use crate::ingest::UploadCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<UploadCoordinator>,
}

impl AppState {
    pub fn new(coordinator: UploadCoordinator) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
        }
    }
}
