use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlEditRequest {
    pub query: String,
    pub instructions: String,
    pub dialect: String,
    pub table_info: Option<String>,
    pub model_id: Option<String>,
    pub openai_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PythonEditRequest {
    pub source: String,
    pub instructions: String,
    #[serde(default)]
    pub allowed_libraries: Vec<String>,
    #[serde(default)]
    pub variables: String,
    pub model_id: Option<String>,
    pub openai_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextToSqlRequest {
    pub question: String,
    pub dialect: String,
    pub table_info: Option<String>,
    pub model_id: Option<String>,
    pub openai_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VegaRequest {
    pub sql: String,
    pub model_id: Option<String>,
    pub openai_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VannaRequest {
    pub instructions: String,
    pub table_info: Option<String>,
    pub model_id: Option<String>,
    pub openai_api_key: Option<String>,
}
