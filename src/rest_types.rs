use std::{fmt::Display, str::FromStr, time::SystemTime};

use serde::{Deserialize, Serialize};

use crate::serde_utils::{deserialize_id, deserialize_timestamp_lenient};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MessageRow {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub relationship: Option<String>,
    pub message: String,
    #[serde(default, deserialize_with = "deserialize_timestamp_lenient")]
    pub created_at: Option<SystemTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    #[default]
    Photo,
    Video,
    Text,
}

impl Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryType::Photo => write!(f, "photo"),
            MemoryType::Video => write!(f, "video"),
            MemoryType::Text => write!(f, "text"),
        }
    }
}

impl FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photo" => Ok(MemoryType::Photo),
            "video" => Ok(MemoryType::Video),
            "text" => Ok(MemoryType::Text),
            other => Err(format!("unknown memory type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MemoryRow {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: MemoryType,
    #[serde(alias = "url", default)]
    pub image_url: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp_lenient")]
    pub created_at: Option<SystemTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Stats {
    #[serde(default)]
    pub donor_count: u64,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub photo_count: u64,
    #[serde(default)]
    pub video_count: u64,
    #[serde(default)]
    pub total_raised: Option<f64>,
    #[serde(default)]
    pub goal: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GalleryFolder {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub gradient: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GalleryImage {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub folder_name: Option<String>,
    #[serde(alias = "url")]
    pub image_url: String,
    #[serde(default)]
    pub order_index: i64,
    #[serde(default, deserialize_with = "deserialize_timestamp_lenient")]
    pub created_at: Option<SystemTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DriveFolder {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, alias = "imageCount")]
    pub image_count: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DriveImage {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(alias = "image_url", alias = "thumbnailUrl")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<MessageRow>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoriesResponse {
    #[serde(default)]
    pub memories: Vec<MemoryRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub stats: Stats,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FoldersResponse<F> {
    #[serde(default = "Vec::new")]
    pub folders: Vec<F>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImagesResponse<I> {
    #[serde(default = "Vec::new")]
    pub images: Vec<I>,
}

/// Generic acknowledgement returned by submission endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Acknowledgement {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DonationIntentResponse {
    pub checkout_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    pub name: String,
    pub relationship: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextMemory {
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PastMemory {
    pub name: String,
    pub relationship: String,
    pub memory: String,
    pub year: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub request_type: String,
    pub number_of_guests: u32,
    pub reason: String,
    pub zoom_interest: bool,
    pub future_updates: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DonationIntentRequest {
    pub amount: f64,
    pub donor_name: String,
    pub donor_email: String,
    pub charity_id: Option<String>,
    pub charity_name: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DonationConfirmation {
    pub payment_intent_id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DriveSyncRequest {
    #[serde(rename = "folderId", skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
}
