//! Stateless greeting service.

use schedulytics_core::proto::{ResponseHello, hello_service_server::HelloService};
use tonic::{Request, Response, Status};

const GREETING: &str = "Hello you!";

#[derive(Clone, Copy, Debug, Default)]
pub struct HelloHandler;

#[tonic::async_trait]
impl HelloService for HelloHandler {
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn say_hello(&self, _req: Request<()>) -> Result<Response<ResponseHello>, Status> {
        Ok(Response::new(ResponseHello {
            response: GREETING.to_string(),
        }))
    }
}
