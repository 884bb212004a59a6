use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ProfessionalRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub specialty: String,
}
