//! MongoDB-backed reference store
//!
//! Documents are expected to look like
//! `{ userid: "42", dob: "1990-01-01", email: "a@x.com" }`; the identifier
//! field name comes from [`ReferenceConfig::id_field`].

use mongodb::bson::{doc, Bson, Document};
use mongodb::options::FindOptions;
use mongodb::sync::{Client, Collection};
use tracing::{debug, info};

use super::{ReferenceError, ReferenceLookup, ReferenceRecord};
use crate::config::ReferenceConfig;

const DOB_FIELD: &str = "dob";
const EMAIL_FIELD: &str = "email";

/// Who owns the MongoDB client used for lookups
pub enum ClientHandle<'a> {
    /// Opened by the store and closed when the store is dropped
    Owned(Client),
    /// Supplied by the caller, who remains responsible for it
    Borrowed(&'a Client),
    /// A fresh client is opened and closed around every lookup
    PerCall,
}

pub struct MongoReferenceStore<'a> {
    handle: ClientHandle<'a>,
    config: ReferenceConfig,
}

impl MongoReferenceStore<'static> {
    /// Connect once and keep the client for the lifetime of the store
    pub fn connect(config: &ReferenceConfig) -> Result<Self, ReferenceError> {
        let client = open_client(config)?;
        Ok(Self {
            handle: ClientHandle::Owned(client),
            config: config.clone(),
        })
    }

    /// Open and close a connection for every lookup
    pub fn per_call(config: &ReferenceConfig) -> Self {
        Self {
            handle: ClientHandle::PerCall,
            config: config.clone(),
        }
    }
}

impl<'a> MongoReferenceStore<'a> {
    /// Reuse a caller-owned client
    pub fn borrowed(client: &'a Client, config: &ReferenceConfig) -> Self {
        Self {
            handle: ClientHandle::Borrowed(client),
            config: config.clone(),
        }
    }

    /// Whether dropping this store (or finishing a lookup) closes a client
    pub fn owns_connection(&self) -> bool {
        !matches!(self.handle, ClientHandle::Borrowed(_))
    }

    fn query(
        &self,
        client: &Client,
        ids: &[String],
    ) -> Result<Vec<(String, ReferenceRecord)>, ReferenceError> {
        let collection: Collection<Document> = client
            .database(&self.config.database)
            .collection(&self.config.collection);

        let id_field = self.config.id_field.as_str();
        let mut filter = Document::new();
        filter.insert(id_field, doc! { "$in": ids.to_vec() });

        let mut projection = doc! { "_id": 0 };
        for field in [id_field, DOB_FIELD, EMAIL_FIELD] {
            projection.insert(field, 1);
        }
        let options = FindOptions::builder().projection(projection).build();

        debug!(
            "Querying {}.{} for {} identifiers",
            self.config.database,
            self.config.collection,
            ids.len()
        );

        let cursor = collection
            .find(filter, options)
            .map_err(|e| ReferenceError::Query(e.to_string()))?;

        let mut found = Vec::new();
        for document in cursor {
            let document = document.map_err(|e| ReferenceError::Query(e.to_string()))?;
            let id = attribute_text(document.get(id_field));
            if id.is_empty() {
                continue;
            }
            found.push((
                id,
                ReferenceRecord {
                    dob: attribute_text(document.get(DOB_FIELD)),
                    email: attribute_text(document.get(EMAIL_FIELD)),
                },
            ));
        }

        Ok(found)
    }
}

impl ReferenceLookup for MongoReferenceStore<'_> {
    fn find_many(&self, ids: &[String]) -> Result<Vec<(String, ReferenceRecord)>, ReferenceError> {
        match &self.handle {
            ClientHandle::Owned(client) => self.query(client, ids),
            ClientHandle::Borrowed(client) => self.query(client, ids),
            ClientHandle::PerCall => {
                let client = open_client(&self.config)?;
                let result = self.query(&client, ids);
                client.shutdown();
                debug!("Closed per-call reference store connection");
                result
            },
        }
    }
}

impl Drop for MongoReferenceStore<'_> {
    fn drop(&mut self) {
        if let ClientHandle::Owned(client) =
            std::mem::replace(&mut self.handle, ClientHandle::PerCall)
        {
            debug!("Closing reference store connection");
            client.shutdown();
        }
    }
}

/// Open a client and verify the server answers before any lookup runs
fn open_client(config: &ReferenceConfig) -> Result<Client, ReferenceError> {
    let client = Client::with_uri_str(&config.uri)
        .map_err(|e| ReferenceError::Connect(e.to_string()))?;

    client
        .database("admin")
        .run_command(doc! { "ping": 1 }, None)
        .map_err(|e| ReferenceError::Connect(e.to_string()))?;

    info!(
        "Connected to MongoDB (database: {}, collection: {})",
        config.database, config.collection
    );
    Ok(client)
}

/// Render a stored value as table text; absent and null become ""
fn attribute_text(value: Option<&Bson>) -> String {
    match value {
        None | Some(Bson::Null) => String::new(),
        Some(Bson::String(s)) => s.trim().to_string(),
        Some(Bson::DateTime(dt)) => dt
            .try_to_rfc3339_string()
            .map(|s| s.chars().take(10).collect())
            .unwrap_or_default(),
        Some(Bson::Int32(n)) => n.to_string(),
        Some(Bson::Int64(n)) => n.to_string(),
        Some(Bson::Double(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}
