use serde::Deserialize;

/// Body of `POST /patients` and `PUT /patients/:id`.
#[derive(Debug, Deserialize)]
pub struct PatientRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}
