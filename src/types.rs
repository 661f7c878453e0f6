use crate::{LeadError, Result, MISSING_VALUE};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// One normalized lead: field names mapped to text values, in projection order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field and returns the record, for building records inline.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets `key` to `value`, replacing an existing value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

/// The result of one fetch. Failures are values and never escape as panics or errors.
#[derive(Debug)]
pub enum FetchOutcome {
    /// At most `truncated_to` records, in upstream order.
    Ok {
        records: Vec<Record>,
        truncated_to: usize,
    },
    /// The provider answered but had no results.
    Empty,
    /// The fetch gave up.
    Failure(LeadError),
}

impl FetchOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, FetchOutcome::Ok { .. })
    }

    pub fn records(&self) -> &[Record] {
        match self {
            FetchOutcome::Ok { records, .. } => records,
            _ => &[],
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            FetchOutcome::Ok { records, .. } => records,
            _ => Vec::new(),
        }
    }
}

/// The scraping providers a fetcher can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Business listings from a map search.
    Maps,
    /// People profiles from a company employee search.
    Profiles,
}

impl Provider {
    /// The value written to the `Source` column.
    pub fn label(&self) -> &'static str {
        match self {
            Provider::Maps => "Google Maps",
            Provider::Profiles => "LinkedIn",
        }
    }

    /// Builds the JSON payload posted to the provider.
    pub fn request_body(&self, query: &str, limit: usize, region: &str) -> Value {
        match self {
            Provider::Maps => json!({ "q": query, "gl": region }),
            Provider::Profiles => json!({
                "queries": [query],
                "maxResults": limit,
                "proxyConfig": { "useApifyProxy": true },
            }),
        }
    }

    /// The header carrying the API key.
    pub fn auth_header(&self, api_key: &str) -> (&'static str, String) {
        match self {
            Provider::Maps => ("X-API-KEY", api_key.to_string()),
            Provider::Profiles => ("Authorization", format!("Bearer {}", api_key)),
        }
    }

    /// Parses a response body and projects the first `limit` results into records.
    ///
    /// An empty vector means the provider reported no results.
    pub fn extract(&self, body: &str, limit: usize) -> Result<Vec<Record>> {
        match self {
            Provider::Maps => {
                let response: PlacesResponse = parse_json(body)?;
                Ok(response
                    .places
                    .unwrap_or_default()
                    .into_iter()
                    .take(limit)
                    .map(Place::into_record)
                    .collect())
            }
            Provider::Profiles => {
                let items = match parse_json::<DatasetResponse>(body)? {
                    DatasetResponse::Items(items) => items,
                    DatasetResponse::Wrapped { items } => items.unwrap_or_default(),
                };
                Ok(items
                    .into_iter()
                    .take(limit)
                    .map(Profile::into_record)
                    .collect())
            }
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Provider {
    type Err = LeadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "maps" => Ok(Provider::Maps),
            "linkedin" | "profiles" => Ok(Provider::Profiles),
            other => Err(LeadError::InvalidInput(format!("unknown source '{}'", other))),
        }
    }
}

fn parse_json<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| LeadError::MalformedResponse(e.to_string()))
}

/// Renders a loosely typed upstream value as cell text.
fn text_of(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => MISSING_VALUE.to_string(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct PlacesResponse {
    places: Option<Vec<Place>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Place {
    title: Option<Value>,
    address: Option<Value>,
    phone_number: Option<Value>,
    rating: Option<Value>,
    description: Option<Value>,
}

impl Place {
    fn into_record(self) -> Record {
        Record::new()
            .with("Source", Provider::Maps.label())
            .with("Name", text_of(self.title))
            .with("Address", text_of(self.address))
            .with("Phone", text_of(self.phone_number))
            .with("Rating", text_of(self.rating))
            .with("Description", text_of(self.description))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DatasetResponse {
    Items(Vec<Profile>),
    Wrapped { items: Option<Vec<Profile>> },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    full_name: Option<Value>,
    position: Option<Value>,
    company_name: Option<Value>,
    location: Option<Value>,
    url: Option<Value>,
}

impl Profile {
    fn into_record(self) -> Record {
        Record::new()
            .with("Source", Provider::Profiles.label())
            .with("Name", text_of(self.full_name))
            .with("Position", text_of(self.position))
            .with("Company", text_of(self.company_name))
            .with("Location", text_of(self.location))
            .with("Profile URL", text_of(self.url))
    }
}
