use std::future::Future;

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::CloudConfig;
use crate::device::{DeviceType, Message};
use crate::request::{Client, RequestError};
use crate::util::http::{InvalidUriError, Uri};
use crate::util::interrupt::Interrupt;
use crate::util::types::{ApiKey, Uuid};

#[derive(Debug, Error)]
pub enum CloudError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("invalid cloud endpoint: {0}")]
    InvalidEndpoint(#[from] InvalidUriError),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(#[from] serde_json::Error),

    /// The device was already activated with the key in the request
    #[error("device already activated")]
    AlreadyActivated,
}

/// Everything the cloud needs to know to accept a new device
#[derive(Serialize, Debug, Clone)]
pub struct ActivationRequest {
    pub uuid: Uuid,
    pub name: String,
    pub device_type: DeviceType,
    /// The key the device will use from now on, chosen by the gateway
    pub device_key: ApiKey,
}

/// Proof that the cloud accepted a message for delivery
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MessageReceipt {
    pub device: Uuid,
    pub message: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Rejected {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// The messaging backend devices report to
///
/// Implementations only move data. Retry policies beyond a single call,
/// key management and scheduling live with the callers.
pub trait Cloud {
    /// Register a device and its key with the backend
    ///
    /// Returns [`CloudError::AlreadyActivated`] if the device was activated
    /// before with the same key.
    fn activate(
        &mut self,
        request: &ActivationRequest,
    ) -> impl Future<Output = Result<(), CloudError>> + Send;

    /// Hand a message over for delivery
    fn send(
        &mut self,
        key: &ApiKey,
        message: &Message,
    ) -> impl Future<Output = Result<MessageReceipt, CloudError>> + Send;

    /// Query the delivery status of a previously sent message
    fn status(
        &mut self,
        key: &ApiKey,
        receipt: &MessageReceipt,
    ) -> impl Future<Output = Result<DeliveryStatus, CloudError>> + Send;
}

/// [`Cloud`] implementation over the JSON/HTTP device API
///
/// - `POST /v1/devices/activate`, authenticated with the provisioning key
/// - `POST /v1/devices/{uuid}/messages`, authenticated with the device key
/// - `GET /v1/devices/{uuid}/messages/{id}`, authenticated with the device key
pub struct HttpCloud {
    api_endpoint: Uri,
    provisioning_key: ApiKey,
    client: Client,
    interrupt: Interrupt,
}

impl HttpCloud {
    /// Create a new client, pending requests are cancelled when `interrupt`
    /// triggers
    pub fn new(config: CloudConfig, interrupt: Interrupt) -> Result<Self, CloudError> {
        Ok(Self {
            api_endpoint: config.api_endpoint,
            provisioning_key: config.provisioning_key,
            client: Client::new(config.request)?,
            interrupt,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Cloud for HttpCloud {
    #[instrument(skip_all, fields(device = %request.uuid), err)]
    async fn activate(&mut self, request: &ActivationRequest) -> Result<(), CloudError> {
        let endpoint = self.api_endpoint.join("/v1/devices/activate")?;
        let body = serde_json::to_value(request)?;

        debug!("calling cloud");
        match self
            .client
            .send(
                Method::POST,
                &endpoint,
                Some(&self.provisioning_key),
                Some(&body),
                &self.interrupt,
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(RequestError::Status(StatusCode::CONFLICT, _)) => Err(CloudError::AlreadyActivated),
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip_all, fields(device = %message.device, sequence = message.sequence), err)]
    async fn send(&mut self, key: &ApiKey, message: &Message) -> Result<MessageReceipt, CloudError> {
        let endpoint = self
            .api_endpoint
            .join(&format!("/v1/devices/{}/messages", message.device))?;
        let body = serde_json::to_value(message)?;

        self.client
            .send(Method::POST, &endpoint, Some(key), Some(&body), &self.interrupt)
            .await?;

        Ok(MessageReceipt {
            device: message.device.clone(),
            message: message.id.clone(),
        })
    }

    #[instrument(skip_all, fields(device = %receipt.device, id = %receipt.message), err)]
    async fn status(
        &mut self,
        key: &ApiKey,
        receipt: &MessageReceipt,
    ) -> Result<DeliveryStatus, CloudError> {
        let endpoint = self.api_endpoint.join(&format!(
            "/v1/devices/{}/messages/{}",
            receipt.device, receipt.message
        ))?;

        let reply = self
            .client
            .send(Method::GET, &endpoint, Some(key), None, &self.interrupt)
            .await?;

        let status = serde_json::from_value(reply.body.unwrap_or_default())?;
        debug!(?status, "received status");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestConfig;
    use crate::device::{Device, Sampler};
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::time::Duration;

    fn message() -> Message {
        let device = Device {
            uuid: "dev-1".parse().unwrap(),
            name: "kitchen".into(),
            device_type: DeviceType::Thermometer,
            active: true,
        };
        Sampler::seeded(1).message(&device, 1)
    }

    fn cloud(server: &Server) -> HttpCloud {
        let config = CloudConfig {
            api_endpoint: server.url().parse().unwrap(),
            provisioning_key: ApiKey::from("provisioning-key"),
            request: RequestConfig {
                timeout: Duration::from_secs(5),
                min_interval: Duration::from_millis(5),
                max_backoff: Duration::from_millis(20),
                max_retries: 1,
            },
        };
        HttpCloud::new(config, Interrupt::new()).unwrap()
    }

    fn activation_request() -> ActivationRequest {
        ActivationRequest {
            uuid: "dev-1".parse().unwrap(),
            name: "kitchen".into(),
            device_type: DeviceType::Thermometer,
            device_key: ApiKey::from("device-key"),
        }
    }

    #[tokio::test]
    async fn activation_uses_the_provisioning_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/devices/activate")
            .match_header("authorization", "Bearer provisioning-key")
            .match_body(Matcher::Json(json!({
                "uuid": "dev-1",
                "name": "kitchen",
                "device_type": "thermometer",
                "device_key": "device-key"
            })))
            .with_status(201)
            .create_async()
            .await;

        cloud(&server).activate(&activation_request()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn activation_conflict_is_reported() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/devices/activate")
            .with_status(409)
            .create_async()
            .await;

        let res = cloud(&server).activate(&activation_request()).await;
        assert!(matches!(res, Err(CloudError::AlreadyActivated)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn messages_are_sent_with_the_device_key() {
        let message = message();
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/devices/dev-1/messages")
            .match_header("authorization", "Bearer device-key")
            .match_body(Matcher::PartialJson(json!({
                "device": "dev-1",
                "device_type": "thermometer",
                "sequence": 1
            })))
            .with_status(202)
            .create_async()
            .await;

        let receipt = cloud(&server)
            .send(&ApiKey::from("device-key"), &message)
            .await
            .unwrap();

        assert_eq!(receipt.device, message.device);
        assert_eq!(receipt.message, message.id);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn it_decodes_delivery_status() {
        let mut server = Server::new_async().await;
        let delivered = server
            .mock("GET", "/v1/devices/dev-1/messages/msg-1")
            .with_status(200)
            .with_body(r#"{"status": "delivered"}"#)
            .create_async()
            .await;
        let rejected = server
            .mock("GET", "/v1/devices/dev-1/messages/msg-2")
            .with_status(200)
            .with_body(r#"{"status": "rejected", "reason": "quota exceeded"}"#)
            .create_async()
            .await;

        let mut cloud = cloud(&server);
        let key = ApiKey::from("device-key");
        let receipt = |id: &str| MessageReceipt {
            device: "dev-1".parse().unwrap(),
            message: id.parse().unwrap(),
        };

        assert_eq!(
            cloud.status(&key, &receipt("msg-1")).await.unwrap(),
            DeliveryStatus::Delivered
        );
        assert_eq!(
            cloud.status(&key, &receipt("msg-2")).await.unwrap(),
            DeliveryStatus::Rejected {
                reason: Some("quota exceeded".into())
            }
        );
        delivered.assert_async().await;
        rejected.assert_async().await;
    }

    #[tokio::test]
    async fn empty_status_replies_are_unexpected() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/devices/dev-1/messages/msg-1")
            .with_status(204)
            .create_async()
            .await;

        let receipt = MessageReceipt {
            device: "dev-1".parse().unwrap(),
            message: "msg-1".parse().unwrap(),
        };
        let res = cloud(&server)
            .status(&ApiKey::from("device-key"), &receipt)
            .await;

        assert!(matches!(res, Err(CloudError::UnexpectedResponse(_))));
        mock.assert_async().await;
    }
}
