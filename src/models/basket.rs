use serde::{Deserialize, Serialize};

/// Row of the `my_images` table.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BasketImage {
    pub id: String,
    pub email: String,
}

/// Image reference handed to the dashboard.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ImageLink {
    pub id: String,
    pub url: String,
}
