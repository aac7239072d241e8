use serde::{Deserialize, Serialize};

/// The signed-in user as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderProfile {
    pub id: String,
    pub name: String,
    /// Profile picture URL.
    pub image: Option<String>,
}

/// `GET /users/me` response envelope.
#[derive(Debug, Deserialize)]
pub struct UserLookupResponse {
    pub data: UserLookupData,
}

#[derive(Debug, Deserialize)]
pub struct UserLookupData {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

impl From<UserLookupData> for ProviderProfile {
    fn from(data: UserLookupData) -> Self {
        Self {
            id: data.id,
            name: data.name,
            image: data.profile_image_url,
        }
    }
}
