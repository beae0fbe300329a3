use std::sync::Arc;

use async_trait::async_trait;
use infra_core::{Request, Response};
use infra_ipc::RequestHandler;

use crate::{handlers::Handler, registry::DriverRegistry};

pub struct DaemonDispatcher {
    handler: Handler,
}

impl DaemonDispatcher {
    pub fn new(handler: Handler) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl RequestHandler for DaemonDispatcher {
    async fn handle(&self, req: Request) -> Response {
        self.handler.handle(req).await
    }
}

impl From<Arc<DriverRegistry>> for DaemonDispatcher {
    fn from(registry: Arc<DriverRegistry>) -> Self {
        Self::new(Handler::new(registry))
    }
}
