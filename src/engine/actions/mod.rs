//! Operation handlers, one per family
//!
//! Each handler reads the fields its family needs from a resolved step and
//! answers to that family's verbs. [`Handler`] is the closed set the
//! executor dispatches through; building one does no I/O.

pub mod api;
pub mod cloud;
pub mod db;
pub mod file;
pub mod messaging;

use serde_json::Value;

use crate::bridge::Backends;
use crate::engine::error::ExecutorError;
use crate::workflow::{OperationFamily, Step};

pub use api::ApiHandler;
pub use cloud::CloudHandler;
pub use db::DbHandler;
pub use file::FileHandler;
pub use messaging::{matches_filter, MessagingHandler};

/// A step bound to the handler for its family
pub enum Handler<'a> {
    Api(ApiHandler<'a>),
    Database(DbHandler<'a>),
    File(FileHandler),
    Cloud(CloudHandler<'a>),
    Messaging(MessagingHandler<'a>),
}

impl<'a> Handler<'a> {
    pub fn build(family: OperationFamily, step: &'a Step, backends: &'a Backends) -> Self {
        match family {
            OperationFamily::Api => Handler::Api(ApiHandler::new(step, &backends.web)),
            OperationFamily::Database => Handler::Database(DbHandler::new(
                step,
                backends.sql.as_ref(),
                backends.secrets.as_ref(),
                &backends.config.database,
            )),
            OperationFamily::File => Handler::File(FileHandler::new(step)),
            OperationFamily::Cloud => Handler::Cloud(CloudHandler::new(
                step,
                backends.cloud.as_ref(),
                backends.secrets.as_ref(),
                &backends.config,
            )),
            OperationFamily::Messaging => Handler::Messaging(MessagingHandler::new(
                step,
                backends.events.as_ref(),
                &backends.config.kafka,
            )),
        }
    }

    pub fn family(&self) -> OperationFamily {
        match self {
            Handler::Api(_) => OperationFamily::Api,
            Handler::Database(_) => OperationFamily::Database,
            Handler::File(_) => OperationFamily::File,
            Handler::Cloud(_) => OperationFamily::Cloud,
            Handler::Messaging(_) => OperationFamily::Messaging,
        }
    }

    /// Run one verb once
    pub async fn invoke(&self, verb: &str) -> Result<Value, ExecutorError> {
        match self {
            Handler::Api(handler) => handler.invoke(verb).await,
            Handler::Database(handler) => handler.invoke(verb).await,
            Handler::File(handler) => handler.invoke(verb).await,
            Handler::Cloud(handler) => handler.invoke(verb).await,
            Handler::Messaging(handler) => handler.invoke(verb).await,
        }
    }
}
