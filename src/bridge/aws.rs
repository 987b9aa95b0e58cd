//! AWS implementation of [`CloudBridge`] and [`SecretBridge`]
//!
//! Clients are built per call from credentials resolved for that call's
//! access role (see [`CredentialSource`]), so nothing is cached between
//! steps.

use async_trait::async_trait;
use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::error::DisplayErrorContext;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::cloud::{BatchJob, CloudBridge, QueryRequest, QueryState};
use super::credentials::CredentialSource;
use super::secrets::SecretBridge;
use super::BridgeError;
use crate::workflow::runner_config::AwsConfig;

#[derive(Debug, Clone)]
pub struct AwsBridge {
    config: AwsConfig,
}

fn cloud_error<E: std::error::Error>(context: &str, error: E) -> BridgeError {
    BridgeError::CloudError(format!("{}: {}", context, DisplayErrorContext(error)))
}

impl AwsBridge {
    pub fn new(config: &AwsConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    async fn sdk_config(&self, access_role: Option<&str>) -> Result<SdkConfig, BridgeError> {
        let region = Region::new(self.config.region.clone());
        let loader = aws_config::defaults(BehaviorVersion::latest()).region(region.clone());

        let sdk = match CredentialSource::resolve(&self.config, access_role)? {
            CredentialSource::Profile { name } => loader.profile_name(name).load().await,
            CredentialSource::AssumeRole {
                cross_role_arn,
                access_role_arn,
            } => {
                debug!("Assuming cross role {}", cross_role_arn);
                let cross = AssumeRoleProvider::builder(cross_role_arn)
                    .session_name("CrossRoleSession")
                    .region(region.clone())
                    .build()
                    .await;

                match access_role_arn {
                    Some(arn) => {
                        debug!("Chaining into access role {}", arn);
                        let access = AssumeRoleProvider::builder(arn)
                            .session_name("AccessRoleSession")
                            .region(region)
                            .build_from_provider(cross)
                            .await;
                        loader.credentials_provider(access).load().await
                    }
                    None => loader.credentials_provider(cross).load().await,
                }
            }
        };

        Ok(sdk)
    }
}

#[async_trait]
impl SecretBridge for AwsBridge {
    async fn fetch_secret(
        &self,
        name: &str,
        access_role: Option<&str>,
    ) -> Result<Map<String, Value>, BridgeError> {
        let client = aws_sdk_secretsmanager::Client::new(&self.sdk_config(access_role).await?);
        let output = client
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|e| cloud_error("get secret value", e))?;

        let text = output.secret_string().unwrap_or("{}");
        match serde_json::from_str(text)? {
            Value::Object(document) => Ok(document),
            _ => Err(BridgeError::CloudError(format!(
                "secret '{}' is not a JSON object",
                name
            ))),
        }
    }
}

#[async_trait]
impl CloudBridge for AwsBridge {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        access_role: Option<&str>,
    ) -> Result<(), BridgeError> {
        let client = aws_sdk_s3::Client::new(&self.sdk_config(access_role).await?);
        client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(aws_sdk_s3::primitives::ByteStream::from(body))
            .send()
            .await
            .map_err(|e| cloud_error("put object", e))?;
        info!("Uploaded s3://{}/{}", bucket, key);
        Ok(())
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        access_role: Option<&str>,
    ) -> Result<String, BridgeError> {
        let client = aws_sdk_s3::Client::new(&self.sdk_config(access_role).await?);
        let output = client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| cloud_error("get object", e))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| BridgeError::CloudError(format!("reading object body: {}", e)))?
            .into_bytes();
        info!("Downloaded s3://{}/{}", bucket, key);
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn submit_job(
        &self,
        job: &BatchJob,
        access_role: Option<&str>,
    ) -> Result<String, BridgeError> {
        let client = aws_sdk_batch::Client::new(&self.sdk_config(access_role).await?);
        let mut request = client
            .submit_job()
            .job_name(&job.name)
            .job_queue(&job.queue)
            .job_definition(&job.definition);

        if let Some(command) = &job.command {
            request = request.container_overrides(
                aws_sdk_batch::types::ContainerOverrides::builder()
                    .set_command(Some(command.clone()))
                    .build(),
            );
        }

        let output = request
            .send()
            .await
            .map_err(|e| cloud_error("submit job", e))?;
        Ok(output.job_id().to_string())
    }

    async fn job_status(
        &self,
        job_id: &str,
        access_role: Option<&str>,
    ) -> Result<Option<String>, BridgeError> {
        let client = aws_sdk_batch::Client::new(&self.sdk_config(access_role).await?);
        let output = client
            .describe_jobs()
            .jobs(job_id)
            .send()
            .await
            .map_err(|e| cloud_error("describe jobs", e))?;

        Ok(output
            .jobs()
            .first()
            .and_then(|job| job.status())
            .map(|status| status.as_str().to_string()))
    }

    async fn cancel_job(
        &self,
        job_id: &str,
        reason: &str,
        access_role: Option<&str>,
    ) -> Result<(), BridgeError> {
        let client = aws_sdk_batch::Client::new(&self.sdk_config(access_role).await?);
        client
            .cancel_job()
            .job_id(job_id)
            .reason(reason)
            .send()
            .await
            .map_err(|e| cloud_error("cancel job", e))?;
        Ok(())
    }

    async fn terminate_job(
        &self,
        job_id: &str,
        reason: &str,
        access_role: Option<&str>,
    ) -> Result<(), BridgeError> {
        let client = aws_sdk_batch::Client::new(&self.sdk_config(access_role).await?);
        client
            .terminate_job()
            .job_id(job_id)
            .reason(reason)
            .send()
            .await
            .map_err(|e| cloud_error("terminate job", e))?;
        Ok(())
    }

    async fn invoke_function(
        &self,
        name: &str,
        invocation_type: &str,
        payload: &Value,
        access_role: Option<&str>,
    ) -> Result<Value, BridgeError> {
        let client = aws_sdk_lambda::Client::new(&self.sdk_config(access_role).await?);
        let output = client
            .invoke()
            .function_name(name)
            .invocation_type(aws_sdk_lambda::types::InvocationType::from(invocation_type))
            .payload(aws_sdk_lambda::primitives::Blob::new(serde_json::to_vec(payload)?))
            .send()
            .await
            .map_err(|e| cloud_error("invoke function", e))?;

        let body = output
            .payload()
            .map(|blob| blob.as_ref().to_vec())
            .unwrap_or_default();
        let decoded = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
        };

        if let Some(kind) = output.function_error() {
            let message = decoded
                .get("errorMessage")
                .and_then(Value::as_str)
                .unwrap_or(kind);
            return Err(BridgeError::CloudError(format!(
                "function {} failed: {}",
                name, message
            )));
        }

        Ok(decoded)
    }

    async fn send_messages(
        &self,
        queue_name: &str,
        messages: &[String],
        access_role: Option<&str>,
    ) -> Result<(), BridgeError> {
        let client = aws_sdk_sqs::Client::new(&self.sdk_config(access_role).await?);
        let queue_url = queue_url(&client, queue_name).await?;

        for message in messages {
            client
                .send_message()
                .queue_url(&queue_url)
                .message_body(message)
                .send()
                .await
                .map_err(|e| cloud_error("send message", e))?;
        }

        info!("Sent {} messages to queue {}", messages.len(), queue_name);
        Ok(())
    }

    async fn receive_messages(
        &self,
        queue_name: &str,
        max_messages: u32,
        wait: Duration,
        access_role: Option<&str>,
    ) -> Result<Vec<String>, BridgeError> {
        let client = aws_sdk_sqs::Client::new(&self.sdk_config(access_role).await?);
        let queue_url = queue_url(&client, queue_name).await?;

        let output = client
            .receive_message()
            .queue_url(&queue_url)
            .max_number_of_messages(max_messages as i32)
            .wait_time_seconds(wait.as_secs() as i32)
            .send()
            .await
            .map_err(|e| cloud_error("receive message", e))?;

        let bodies: Vec<String> = output
            .messages()
            .iter()
            .map(|message| message.body().unwrap_or_default().to_string())
            .collect();

        info!("Received {} messages from queue {}", bodies.len(), queue_name);
        Ok(bodies)
    }

    async fn start_query(
        &self,
        request: &QueryRequest,
        access_role: Option<&str>,
    ) -> Result<String, BridgeError> {
        use aws_sdk_athena::types::{QueryExecutionContext, ResultConfiguration};

        let client = aws_sdk_athena::Client::new(&self.sdk_config(access_role).await?);
        let output = client
            .start_query_execution()
            .query_string(&request.query)
            .query_execution_context(
                QueryExecutionContext::builder()
                    .database(&request.database)
                    .build(),
            )
            .result_configuration(
                ResultConfiguration::builder()
                    .output_location(&request.output_location)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| cloud_error("start query execution", e))?;

        output
            .query_execution_id()
            .map(str::to_string)
            .ok_or_else(|| BridgeError::CloudError("query execution id missing".to_string()))
    }

    async fn query_state(
        &self,
        execution_id: &str,
        access_role: Option<&str>,
    ) -> Result<QueryState, BridgeError> {
        use aws_sdk_athena::types::QueryExecutionState;

        let client = aws_sdk_athena::Client::new(&self.sdk_config(access_role).await?);
        let output = client
            .get_query_execution()
            .query_execution_id(execution_id)
            .send()
            .await
            .map_err(|e| cloud_error("get query execution", e))?;

        let state = output
            .query_execution()
            .and_then(|execution| execution.status())
            .and_then(|status| status.state());

        Ok(match state {
            Some(QueryExecutionState::Succeeded) => QueryState::Succeeded,
            Some(QueryExecutionState::Failed) => QueryState::Failed,
            Some(QueryExecutionState::Cancelled) => QueryState::Cancelled,
            Some(QueryExecutionState::Running) => QueryState::Running,
            _ => QueryState::Queued,
        })
    }

    async fn query_rows(
        &self,
        execution_id: &str,
        access_role: Option<&str>,
    ) -> Result<Vec<Vec<Option<String>>>, BridgeError> {
        let client = aws_sdk_athena::Client::new(&self.sdk_config(access_role).await?);
        let output = client
            .get_query_results()
            .query_execution_id(execution_id)
            .send()
            .await
            .map_err(|e| cloud_error("get query results", e))?;

        Ok(output
            .result_set()
            .map(|set| {
                set.rows()
                    .iter()
                    .map(|row| {
                        row.data()
                            .iter()
                            .map(|datum| datum.var_char_value().map(str::to_string))
                            .collect()
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

async fn queue_url(client: &aws_sdk_sqs::Client, queue_name: &str) -> Result<String, BridgeError> {
    client
        .get_queue_url()
        .queue_name(queue_name)
        .send()
        .await
        .map_err(|e| cloud_error("get queue url", e))?
        .queue_url()
        .map(str::to_string)
        .ok_or_else(|| BridgeError::CloudError(format!("no url for queue {}", queue_name)))
}
