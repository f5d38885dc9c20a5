// Application state for HTTP handlers
use crate::application::ingestion::IngestionService;
use crate::application::session_controller::SessionController;
use crate::domain::substance::SubstanceCatalog;
use crate::infrastructure::local_auth::LocalAuthProvider;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub ingestion: IngestionService,
    pub session: Arc<SessionController>,
    pub auth: Arc<LocalAuthProvider>,
    pub catalog: Arc<SubstanceCatalog>,
}
