//! In-process stand-in for the REST backend.
//!
//! Selected with `BACKEND_URL=memory:` for local demos; the test suites use it
//! to observe which calls a request made.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard,
};

use async_trait::async_trait;

use crate::models::{
    chat::ChatTranscript,
    driver::Driver,
    invoice::{Attachment, DriverTotal, Invoice, InvoiceKind, NewInvoice},
    maintenance::{Maintenance, NewMaintenance},
    trip::{NewTrip, Trip, UserStats},
};

use super::backend::{BackendApi, ClientError};

#[derive(Default)]
struct Store {
    next_id: u64,
    tokens: Vec<(String, String)>,
    trips: Vec<Trip>,
    invoices: Vec<Invoice>,
    attachments: Vec<(String, Attachment)>,
    maintenance: Vec<Maintenance>,
    chats: Vec<ChatTranscript>,
    mileage: Option<u32>,
    forced_status: Option<(u16, String)>,
    failing_paths: Vec<(String, u16, String)>,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    store: Arc<Mutex<Store>>,
    calls: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers credentials that `login` accepts.
    pub fn with_user(self, username: &str, password: &str) -> Self {
        self.lock()
            .tokens
            .push((username.to_string(), password.to_string()));
        self
    }

    /// Number of backend calls made so far, `login` included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_mileage(&self, mileage: u32) {
        self.lock().mileage = Some(mileage);
    }

    /// Makes every following call fail with the given HTTP status.
    pub fn fail_with(&self, status: u16, body: &str) {
        self.lock().forced_status = Some((status, body.to_string()));
    }

    /// Makes calls to one endpoint path fail, leaving the others working.
    pub fn fail_path(&self, path: &str, status: u16, body: &str) {
        self.lock()
            .failing_paths
            .push((path.to_string(), status, body.to_string()));
    }

    pub fn invoices(&self) -> Vec<Invoice> {
        self.lock().invoices.clone()
    }

    pub fn attachment_for(&self, invoice_id: &str) -> Option<Attachment> {
        self.lock()
            .attachments
            .iter()
            .find(|(id, _)| id == invoice_id)
            .map(|(_, a)| a.clone())
    }

    pub fn chats(&self) -> Vec<ChatTranscript> {
        self.lock().chats.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(
        &self,
        method: &str,
        path: &str,
        token: &str,
    ) -> Result<MutexGuard<'_, Store>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let store = self.lock();
        if let Some((status, body)) = store.forced_status.clone() {
            return Err(status_error(status, method, path, &body));
        }
        if let Some((_, status, body)) = store.failing_paths.iter().find(|(p, _, _)| p == path) {
            return Err(status_error(*status, method, path, body));
        }
        let known = store
            .tokens
            .iter()
            .any(|(user, _)| token == token_for(user));
        if !known {
            return Err(status_error(401, method, path, "invalid token"));
        }
        Ok(store)
    }
}

fn token_for(username: &str) -> String {
    format!("memory-token-{username}")
}

fn status_error(status: u16, method: &str, path: &str, body: &str) -> ClientError {
    ClientError::Status {
        status,
        method: method.to_string(),
        url: format!("memory:/{path}"),
        body: body.to_string(),
    }
}

fn not_found(method: &str, path: &str) -> ClientError {
    status_error(404, method, path, "not found")
}

impl Store {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

fn replace<T, F>(items: &mut [T], matches: F, value: T) -> bool
where
    F: Fn(&T) -> bool,
{
    match items.iter_mut().find(|item| matches(item)) {
        Some(slot) => {
            *slot = value;
            true
        }
        None => false,
    }
}

fn remove<T, F>(items: &mut Vec<T>, matches: F) -> bool
where
    F: Fn(&T) -> bool,
{
    let before = items.len();
    items.retain(|item| !matches(item));
    items.len() != before
}

#[async_trait]
impl BackendApi for MemoryBackend {
    async fn login(&self, username: &str, password: &str) -> Result<String, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let store = self.lock();
        let ok = store
            .tokens
            .iter()
            .any(|(user, pass)| user == username && pass == password);
        if ok {
            Ok(token_for(username))
        } else {
            Err(status_error(401, "POST", "auth/login", "invalid credentials"))
        }
    }

    async fn list_trips(&self, token: &str) -> Result<Vec<Trip>, ClientError> {
        Ok(self.begin("GET", "trips", token)?.trips.clone())
    }

    async fn get_trip(&self, token: &str, id: &str) -> Result<Trip, ClientError> {
        let path = format!("trips/{id}");
        let store = self.begin("GET", &path, token)?;
        store
            .trips
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| not_found("GET", &path))
    }

    async fn create_trip(&self, token: &str, trip: &NewTrip) -> Result<String, ClientError> {
        let mut store = self.begin("POST", "trips", token)?;
        let id = store.next_id("trip");
        store.trips.push(Trip {
            id: id.clone(),
            fields: trip.clone(),
        });
        Ok(id)
    }

    async fn update_trip(&self, token: &str, trip: &Trip) -> Result<String, ClientError> {
        let path = format!("trips/{}", trip.id);
        let mut store = self.begin("PUT", &path, token)?;
        if replace(&mut store.trips, |t| t.id == trip.id, trip.clone()) {
            Ok(trip.id.clone())
        } else {
            Err(not_found("PUT", &path))
        }
    }

    async fn delete_trip(&self, token: &str, id: &str) -> Result<String, ClientError> {
        let path = format!("trips/{id}");
        let mut store = self.begin("DELETE", &path, token)?;
        if remove(&mut store.trips, |t| t.id == id) {
            Ok(id.to_string())
        } else {
            Err(not_found("DELETE", &path))
        }
    }

    async fn user_stats(&self, token: &str) -> Result<UserStats, ClientError> {
        let store = self.begin("GET", "users/me/stats", token)?;
        let total_distance = store.trips.iter().filter_map(|t| t.fields.distance).sum();
        Ok(UserStats { total_distance })
    }

    async fn calculate_distance(
        &self,
        token: &str,
        from: &str,
        to: &str,
    ) -> Result<f64, ClientError> {
        self.begin("GET", "trips/distance", token)?;
        // Deterministic fake: the further apart the names, the longer the drive.
        let spread = from.len().abs_diff(to.len()) as f64;
        Ok(if from == to { 0.0 } else { 10.0 + spread * 5.0 })
    }

    async fn find_cities(&self, token: &str, query: &str) -> Result<Vec<String>, ClientError> {
        self.begin("GET", "cities", token)?;
        let needle = query.trim().to_lowercase();
        Ok(["Berlin", "Bremen", "Dresden", "Hamburg", "Leipzig", "München"]
            .iter()
            .filter(|city| !needle.is_empty() && city.to_lowercase().starts_with(&needle))
            .map(|city| city.to_string())
            .collect())
    }

    async fn list_invoices(&self, token: &str) -> Result<Vec<Invoice>, ClientError> {
        Ok(self.begin("GET", "invoices", token)?.invoices.clone())
    }

    async fn create_invoice(
        &self,
        token: &str,
        invoice: &NewInvoice,
        attachment: Option<&Attachment>,
    ) -> Result<String, ClientError> {
        let mut store = self.begin("POST", "invoices", token)?;
        let id = store.next_id("invoice");
        let mut fields = invoice.clone();
        if let Some(file) = attachment {
            fields.attachment = Some(format!("files/{id}/{}", file.file_name));
            store.attachments.push((id.clone(), file.clone()));
        }
        store.invoices.push(Invoice {
            id: id.clone(),
            fields,
        });
        Ok(id)
    }

    async fn update_invoice(
        &self,
        token: &str,
        invoice: &Invoice,
        attachment: Option<&Attachment>,
    ) -> Result<String, ClientError> {
        let path = format!("invoices/{}", invoice.id);
        let mut store = self.begin("PUT", &path, token)?;
        let mut updated = invoice.clone();
        if let Some(file) = attachment {
            updated.fields.attachment = Some(format!("files/{}/{}", invoice.id, file.file_name));
            store.attachments.retain(|(id, _)| *id != invoice.id);
            store.attachments.push((invoice.id.clone(), file.clone()));
        }
        if replace(&mut store.invoices, |i| i.id == invoice.id, updated) {
            Ok(invoice.id.clone())
        } else {
            Err(not_found("PUT", &path))
        }
    }

    async fn delete_invoice(&self, token: &str, id: &str) -> Result<String, ClientError> {
        let path = format!("invoices/{id}");
        let mut store = self.begin("DELETE", &path, token)?;
        if remove(&mut store.invoices, |i| i.id == id) {
            store.attachments.retain(|(owner, _)| owner != id);
            Ok(id.to_string())
        } else {
            Err(not_found("DELETE", &path))
        }
    }

    async fn driver_totals(&self, token: &str) -> Result<Vec<DriverTotal>, ClientError> {
        let store = self.begin("GET", "invoices/totals", token)?;
        let totals = Driver::ALL
            .iter()
            .map(|driver| {
                // A reimbursement moves money from payer to counter-party, so
                // it counts for the payer and against the counter-party.
                let total = store
                    .invoices
                    .iter()
                    .map(|i| {
                        let f = &i.fields;
                        if f.driver == *driver {
                            f.amount
                        } else if f.counter_party == Some(*driver)
                            && f.kind == InvoiceKind::Reimbursement
                        {
                            -f.amount
                        } else {
                            0.0
                        }
                    })
                    .sum();
                DriverTotal {
                    driver: *driver,
                    total,
                }
            })
            .collect();
        Ok(totals)
    }

    async fn list_maintenance(&self, token: &str) -> Result<Vec<Maintenance>, ClientError> {
        Ok(self.begin("GET", "maintenance", token)?.maintenance.clone())
    }

    async fn create_maintenance(
        &self,
        token: &str,
        record: &NewMaintenance,
    ) -> Result<String, ClientError> {
        let mut store = self.begin("POST", "maintenance", token)?;
        let id = store.next_id("maintenance");
        store.maintenance.push(Maintenance {
            id: id.clone(),
            fields: record.clone(),
        });
        Ok(id)
    }

    async fn update_maintenance(
        &self,
        token: &str,
        record: &Maintenance,
    ) -> Result<String, ClientError> {
        let path = format!("maintenance/{}", record.id);
        let mut store = self.begin("PUT", &path, token)?;
        if replace(&mut store.maintenance, |m| m.id == record.id, record.clone()) {
            Ok(record.id.clone())
        } else {
            Err(not_found("PUT", &path))
        }
    }

    async fn delete_maintenance(&self, token: &str, id: &str) -> Result<String, ClientError> {
        let path = format!("maintenance/{id}");
        let mut store = self.begin("DELETE", &path, token)?;
        if remove(&mut store.maintenance, |m| m.id == id) {
            Ok(id.to_string())
        } else {
            Err(not_found("DELETE", &path))
        }
    }

    async fn car_mileage(&self, token: &str) -> Result<Option<u32>, ClientError> {
        Ok(self.begin("GET", "car/mileage", token)?.mileage)
    }

    async fn save_chat(&self, token: &str, transcript: &ChatTranscript) -> Result<(), ClientError> {
        self.begin("POST", "chats", token)?
            .chats
            .push(transcript.clone());
        Ok(())
    }
}

/// The token [`MemoryBackend::login`] hands out for `username`.
pub fn memory_token(username: &str) -> String {
    token_for(username)
}
