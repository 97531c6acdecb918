use async_trait::async_trait;
use reqwest::{multipart, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::models::{
    chat::ChatTranscript,
    invoice::{Attachment, DriverTotal, Invoice, NewInvoice},
    maintenance::{Maintenance, NewMaintenance},
    trip::{NewTrip, Trip, UserStats},
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} {url} returned {status}: {body}")]
    Status {
        status: u16,
        method: String,
        url: String,
        body: String,
    },
    #[error("unexpected response from {method} {url}: {message}")]
    Decode {
        method: String,
        url: String,
        message: String,
    },
    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid record id {0:?}")]
    InvalidId(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Everything the app needs from the persistence backend.
///
/// Every call but `login` carries the bearer token from the session cookie.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<String, ClientError>;

    async fn list_trips(&self, token: &str) -> Result<Vec<Trip>, ClientError>;
    async fn get_trip(&self, token: &str, id: &str) -> Result<Trip, ClientError>;
    async fn create_trip(&self, token: &str, trip: &NewTrip) -> Result<String, ClientError>;
    async fn update_trip(&self, token: &str, trip: &Trip) -> Result<String, ClientError>;
    async fn delete_trip(&self, token: &str, id: &str) -> Result<String, ClientError>;
    async fn user_stats(&self, token: &str) -> Result<UserStats, ClientError>;
    async fn calculate_distance(
        &self,
        token: &str,
        from: &str,
        to: &str,
    ) -> Result<f64, ClientError>;
    async fn find_cities(&self, token: &str, query: &str) -> Result<Vec<String>, ClientError>;

    async fn list_invoices(&self, token: &str) -> Result<Vec<Invoice>, ClientError>;
    async fn create_invoice(
        &self,
        token: &str,
        invoice: &NewInvoice,
        attachment: Option<&Attachment>,
    ) -> Result<String, ClientError>;
    async fn update_invoice(
        &self,
        token: &str,
        invoice: &Invoice,
        attachment: Option<&Attachment>,
    ) -> Result<String, ClientError>;
    async fn delete_invoice(&self, token: &str, id: &str) -> Result<String, ClientError>;
    async fn driver_totals(&self, token: &str) -> Result<Vec<DriverTotal>, ClientError>;

    async fn list_maintenance(&self, token: &str) -> Result<Vec<Maintenance>, ClientError>;
    async fn create_maintenance(
        &self,
        token: &str,
        record: &NewMaintenance,
    ) -> Result<String, ClientError>;
    async fn update_maintenance(
        &self,
        token: &str,
        record: &Maintenance,
    ) -> Result<String, ClientError>;
    async fn delete_maintenance(&self, token: &str, id: &str) -> Result<String, ClientError>;
    async fn car_mileage(&self, token: &str) -> Result<Option<u32>, ClientError>;

    async fn save_chat(&self, token: &str, transcript: &ChatTranscript) -> Result<(), ClientError>;
}

/// Ids come back as JSON strings or numbers depending on the endpoint.
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordId {
    Text(String),
    Number(i64),
    Wrapped { id: Box<RecordId> },
}

impl RecordId {
    fn into_string(self) -> String {
        match self {
            RecordId::Text(id) => id,
            RecordId::Number(id) => id.to_string(),
            RecordId::Wrapped { id } => id.into_string(),
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Serialize)]
struct DistanceQuery<'a> {
    from: &'a str,
    to: &'a str,
}

#[derive(Serialize)]
struct CityQuery<'a> {
    query: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            http: reqwest::Client::new(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }

    /// `{base}/{collection}/{id}` with `id` encoded as a single path segment.
    fn record_url(&self, collection: &str, id: &str) -> Result<Url, ClientError> {
        if id.is_empty() || id == "." || id == ".." {
            return Err(ClientError::InvalidId(id.to_string()));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend([collection, id]);
        Ok(url)
    }

    fn request(
        &self,
        method: Method,
        url: Url,
        token: Option<&str>,
    ) -> (RequestBuilder, Url) {
        let mut builder = self.http.request(method, url.clone());
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        (builder, url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        builder: RequestBuilder,
    ) -> Result<T, ClientError> {
        debug!(%method, %url, "backend request");
        let res = builder
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                method: method.to_string(),
                url: url.to_string(),
                source,
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                method: method.to_string(),
                url: url.to_string(),
                body,
            });
        }

        let bytes = res.bytes().await.map_err(|source| ClientError::Transport {
            method: method.to_string(),
            url: url.to_string(),
            source,
        })?;
        let raw: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
        serde_json::from_slice(raw).map_err(|err| ClientError::Decode {
            method: method.to_string(),
            url: url.to_string(),
            message: err.to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, token: &str, url: Url) -> Result<T, ClientError> {
        let (builder, url) = self.request(Method::GET, url, Some(token));
        self.send(Method::GET, url, builder).await
    }

    async fn get_query<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        token: &str,
        path: &str,
        query: &Q,
    ) -> Result<T, ClientError> {
        let (builder, url) = self.request(Method::GET, self.url(path)?, Some(token));
        self.send(Method::GET, url, builder.query(query)).await
    }

    async fn write_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        token: &str,
        url: Url,
        body: &B,
    ) -> Result<String, ClientError> {
        let (builder, url) = self.request(method.clone(), url, Some(token));
        let id: RecordId = self.send(method, url, builder.json(body)).await?;
        Ok(id.into_string())
    }

    async fn write_multipart<B: Serialize + ?Sized>(
        &self,
        method: Method,
        token: &str,
        url: Url,
        body: &B,
        attachment: Option<&Attachment>,
    ) -> Result<String, ClientError> {
        let Some(attachment) = attachment else {
            return self.write_json(method, token, url, body).await;
        };
        let (builder, url) = self.request(method.clone(), url, Some(token));
        let payload = serde_json::to_string(body).map_err(|err| ClientError::Decode {
            method: method.to_string(),
            url: url.to_string(),
            message: err.to_string(),
        })?;
        let file = multipart::Part::bytes(attachment.bytes.clone())
            .file_name(attachment.file_name.clone())
            .mime_str(&attachment.content_type)
            .map_err(|source| ClientError::Transport {
                method: method.to_string(),
                url: url.to_string(),
                source,
            })?;
        let form = multipart::Form::new()
            .text("payload", payload)
            .part("file", file);
        let id: RecordId = self.send(method, url, builder.multipart(form)).await?;
        Ok(id.into_string())
    }

    async fn delete(&self, token: &str, url: Url) -> Result<String, ClientError> {
        let (builder, url) = self.request(Method::DELETE, url, Some(token));
        let id: Option<RecordId> = self.send(Method::DELETE, url, builder).await?;
        Ok(id.map(RecordId::into_string).unwrap_or_default())
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn login(&self, username: &str, password: &str) -> Result<String, ClientError> {
        let (builder, url) = self.request(Method::POST, self.url("auth/login")?, None);
        let res: LoginResponse = self
            .send(
                Method::POST,
                url,
                builder.json(&LoginRequest { username, password }),
            )
            .await?;
        Ok(res.token)
    }

    async fn list_trips(&self, token: &str) -> Result<Vec<Trip>, ClientError> {
        self.get(token, self.url("trips")?).await
    }

    async fn get_trip(&self, token: &str, id: &str) -> Result<Trip, ClientError> {
        self.get(token, self.record_url("trips", id)?).await
    }

    async fn create_trip(&self, token: &str, trip: &NewTrip) -> Result<String, ClientError> {
        self.write_json(Method::POST, token, self.url("trips")?, trip)
            .await
    }

    async fn update_trip(&self, token: &str, trip: &Trip) -> Result<String, ClientError> {
        let url = self.record_url("trips", &trip.id)?;
        self.write_json(Method::PUT, token, url, trip).await
    }

    async fn delete_trip(&self, token: &str, id: &str) -> Result<String, ClientError> {
        let deleted = self.delete(token, self.record_url("trips", id)?).await?;
        Ok(if deleted.is_empty() { id.to_string() } else { deleted })
    }

    async fn user_stats(&self, token: &str) -> Result<UserStats, ClientError> {
        self.get(token, self.url("users/me/stats")?).await
    }

    async fn calculate_distance(
        &self,
        token: &str,
        from: &str,
        to: &str,
    ) -> Result<f64, ClientError> {
        self.get_query(token, "trips/distance", &DistanceQuery { from, to })
            .await
    }

    async fn find_cities(&self, token: &str, query: &str) -> Result<Vec<String>, ClientError> {
        self.get_query(token, "cities", &CityQuery { query }).await
    }

    async fn list_invoices(&self, token: &str) -> Result<Vec<Invoice>, ClientError> {
        self.get(token, self.url("invoices")?).await
    }

    async fn create_invoice(
        &self,
        token: &str,
        invoice: &NewInvoice,
        attachment: Option<&Attachment>,
    ) -> Result<String, ClientError> {
        self.write_multipart(Method::POST, token, self.url("invoices")?, invoice, attachment)
            .await
    }

    async fn update_invoice(
        &self,
        token: &str,
        invoice: &Invoice,
        attachment: Option<&Attachment>,
    ) -> Result<String, ClientError> {
        let url = self.record_url("invoices", &invoice.id)?;
        self.write_multipart(Method::PUT, token, url, invoice, attachment)
            .await
    }

    async fn delete_invoice(&self, token: &str, id: &str) -> Result<String, ClientError> {
        let deleted = self.delete(token, self.record_url("invoices", id)?).await?;
        Ok(if deleted.is_empty() { id.to_string() } else { deleted })
    }

    async fn driver_totals(&self, token: &str) -> Result<Vec<DriverTotal>, ClientError> {
        self.get(token, self.url("invoices/totals")?).await
    }

    async fn list_maintenance(&self, token: &str) -> Result<Vec<Maintenance>, ClientError> {
        self.get(token, self.url("maintenance")?).await
    }

    async fn create_maintenance(
        &self,
        token: &str,
        record: &NewMaintenance,
    ) -> Result<String, ClientError> {
        self.write_json(Method::POST, token, self.url("maintenance")?, record)
            .await
    }

    async fn update_maintenance(
        &self,
        token: &str,
        record: &Maintenance,
    ) -> Result<String, ClientError> {
        let url = self.record_url("maintenance", &record.id)?;
        self.write_json(Method::PUT, token, url, record).await
    }

    async fn delete_maintenance(&self, token: &str, id: &str) -> Result<String, ClientError> {
        let deleted = self.delete(token, self.record_url("maintenance", id)?).await?;
        Ok(if deleted.is_empty() { id.to_string() } else { deleted })
    }

    async fn car_mileage(&self, token: &str) -> Result<Option<u32>, ClientError> {
        self.get(token, self.url("car/mileage")?).await
    }

    async fn save_chat(&self, token: &str, transcript: &ChatTranscript) -> Result<(), ClientError> {
        let (builder, url) = self.request(Method::POST, self.url("chats")?, Some(token));
        let _: serde_json::Value = self
            .send(Method::POST, url, builder.json(transcript))
            .await?;
        Ok(())
    }
}
