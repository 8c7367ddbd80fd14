//! Prompt chains: template, model call, parser.

use futures_util::future;
use futures_util::stream::{BoxStream, StreamExt};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::models::{
    PythonEditRequest, SqlEditRequest, TextToSqlRequest, VannaRequest, VegaRequest,
};
use super::parser::{parse_json_markdown, ResponseSchema, StructuredOutputParser};
use super::prompts::{self, render};
use super::provider::{LlmError, LlmProvider};

pub type JsonObject = Map<String, Value>;

/// Single completion parsed against required keys, with one model-assisted
/// fix attempt and a local repair as the last resort.
pub struct StructuredChain {
    provider: Arc<dyn LlmProvider>,
    parser: StructuredOutputParser,
}

impl StructuredChain {
    pub fn new(provider: Arc<dyn LlmProvider>, schemas: Vec<ResponseSchema>) -> Self {
        Self {
            provider,
            parser: StructuredOutputParser::new(schemas),
        }
    }

    pub async fn invoke(&self, template: &str, vars: &[(&str, &str)]) -> Result<JsonObject, LlmError> {
        let format_instructions = self.parser.format_instructions();
        let mut all_vars = vars.to_vec();
        all_vars.push(("format_instructions", format_instructions.as_str()));

        let prompt = render(template, &all_vars);
        let completion = self.provider.complete(&prompt).await?;

        let error = match self.parser.parse(&completion) {
            Ok(object) => return Ok(object),
            Err(e) => e,
        };

        warn!(
            provider = self.provider.name(),
            "Model output did not match the schema ({}), asking for a fix", error
        );

        let error_text = error.to_string();
        let fix_prompt = render(
            prompts::OUTPUT_FIX,
            &[
                ("instructions", format_instructions.as_str()),
                ("completion", completion.as_str()),
                ("error", error_text.as_str()),
            ],
        );

        let fixed = match self.provider.complete(&fix_prompt).await {
            Ok(fixed) => match self.parser.parse(&fixed) {
                Ok(object) => return Ok(object),
                Err(e) => {
                    warn!("Fixed output still invalid: {}", e);
                    Some(fixed)
                }
            },
            Err(e) => {
                warn!("Output fixing call failed: {}", e);
                None
            }
        };

        let mut candidates: Vec<&str> = Vec::with_capacity(2);
        if let Some(fixed) = fixed.as_deref() {
            candidates.push(fixed);
        }
        candidates.push(&completion);

        Ok(self.parser.repair(&candidates))
    }
}

/// Tracks accumulated model text and the last JSON value emitted from it.
#[derive(Debug, Default)]
pub struct JsonAccumulator {
    text: String,
    last: Option<Value>,
}

impl JsonAccumulator {
    /// Returns a newline-terminated JSON line when the parsed value changed.
    pub fn push(&mut self, token: &str) -> Option<String> {
        self.text.push_str(token);

        let value = parse_json_markdown(&self.text)?;
        if self.last.as_ref() == Some(&value) {
            return None;
        }

        let line = format!("{}\n", value);
        self.last = Some(value);
        Some(line)
    }
}

/// Streams the model's answer as successive JSON snapshots, one per line.
///
/// Failing to start the model call is an error; a failure mid-stream ends the
/// sequence after whatever was already emitted.
pub async fn stream_json_lines(
    provider: Arc<dyn LlmProvider>,
    prompt: String,
) -> Result<BoxStream<'static, String>, LlmError> {
    let tokens = provider.stream(&prompt).await?;
    let name = provider.name().to_string();

    let lines = tokens
        .scan(JsonAccumulator::default(), move |acc, token| {
            let next = match token {
                Ok(token) => Some(acc.push(&token)),
                Err(e) => {
                    warn!(provider = %name, "Model stream failed: {}", e);
                    None
                }
            };
            future::ready(next)
        })
        .filter_map(future::ready)
        .boxed();

    Ok(lines)
}

fn table_info(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

pub fn sql_edit_stream_prompt(req: &SqlEditRequest) -> String {
    render(
        prompts::SQL_EDIT_STREAM,
        &[
            ("dialect", req.dialect.as_str()),
            ("table_info", table_info(&req.table_info)),
            ("query", req.query.as_str()),
            ("instructions", req.instructions.as_str()),
        ],
    )
}

pub fn python_edit_stream_prompt(req: &PythonEditRequest) -> String {
    let libraries = req.allowed_libraries.join(", ");
    render(
        prompts::PYTHON_EDIT_STREAM,
        &[
            ("allowed_libraries", libraries.as_str()),
            ("source", req.source.as_str()),
            ("variables", req.variables.as_str()),
            ("instructions", req.instructions.as_str()),
        ],
    )
}

pub async fn sql_edit(provider: Arc<dyn LlmProvider>, req: &SqlEditRequest) -> Result<JsonObject, LlmError> {
    let chain = StructuredChain::new(
        provider,
        vec![ResponseSchema::string("sql", "This is the generated query")],
    );
    chain
        .invoke(
            prompts::SQL_EDIT,
            &[
                ("dialect", req.dialect.as_str()),
                ("table_info", table_info(&req.table_info)),
                ("query", req.query.as_str()),
                ("instructions", req.instructions.as_str()),
            ],
        )
        .await
}

pub async fn python_edit(
    provider: Arc<dyn LlmProvider>,
    req: &PythonEditRequest,
) -> Result<JsonObject, LlmError> {
    let libraries = req.allowed_libraries.join(", ");
    let chain = StructuredChain::new(
        provider,
        vec![ResponseSchema::string("source", "This is the generated Python code")],
    );
    chain
        .invoke(
            prompts::PYTHON_EDIT,
            &[
                ("allowed_libraries", libraries.as_str()),
                ("source", req.source.as_str()),
                ("instructions", req.instructions.as_str()),
            ],
        )
        .await
}

pub async fn text_to_sql(
    provider: Arc<dyn LlmProvider>,
    req: &TextToSqlRequest,
) -> Result<JsonObject, LlmError> {
    let top_k = prompts::DEFAULT_TOP_K.to_string();
    let chain = StructuredChain::new(
        provider,
        vec![
            ResponseSchema::string("question", "This is the input question"),
            ResponseSchema::string("sql", "This is the generated query"),
            ResponseSchema::array(
                "reasoning",
                "This is the trail of thought that lead to the generated query, usually 3 to 4 steps",
            ),
        ],
    );
    chain
        .invoke(
            prompts::TEXT_TO_SQL,
            &[
                ("dialect", req.dialect.as_str()),
                ("top_k", top_k.as_str()),
                ("table_info", table_info(&req.table_info)),
                ("question", req.question.as_str()),
            ],
        )
        .await
}

pub async fn vega_spec(provider: Arc<dyn LlmProvider>, req: &VegaRequest) -> Result<JsonObject, LlmError> {
    let chain = StructuredChain::new(
        provider,
        vec![ResponseSchema::object(
            "spec",
            "This is the generated vega lite spec, omit the \"data\" property",
        )],
    );
    chain.invoke(prompts::VEGA, &[("sql", req.sql.as_str())]).await
}

pub async fn question_to_sql(
    provider: Arc<dyn LlmProvider>,
    req: &VannaRequest,
) -> Result<JsonObject, LlmError> {
    debug!("Generating SQL for question of {} chars", req.instructions.len());
    let chain = StructuredChain::new(
        provider,
        vec![ResponseSchema::string("sql", "This is the generated query")],
    );
    chain
        .invoke(
            prompts::QUESTION_TO_SQL,
            &[
                ("table_info", table_info(&req.table_info)),
                ("instructions", req.instructions.as_str()),
            ],
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedProvider;
    use serde_json::json;

    fn sql_edit_request(query: &str, instructions: &str) -> SqlEditRequest {
        SqlEditRequest {
            query: query.to_string(),
            instructions: instructions.to_string(),
            dialect: "PostgreSQL".to_string(),
            table_info: Some("CREATE TABLE users (id int, name text, email text)".to_string()),
            model_id: None,
            openai_api_key: None,
        }
    }

    #[tokio::test]
    async fn test_structured_chain_parses_first_answer() {
        let provider = ScriptedProvider::new(vec!["```json\n{\"sql\": \"SELECT name FROM users\"}\n```"]);
        let result = sql_edit(provider.clone(), &sql_edit_request("", "select only the name column"))
            .await
            .unwrap();

        assert_eq!(result["sql"], "SELECT name FROM users");
        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("manipulation instructions: ```select only the name column```"));
        assert!(prompts[0].contains("\"sql\": string  // This is the generated query"));
        assert!(prompts[0].contains("CREATE TABLE users"));
    }

    #[tokio::test]
    async fn test_structured_chain_asks_model_to_fix_output() {
        let provider = ScriptedProvider::new(vec![
            "Here is your query: SELECT name FROM users",
            "{\"sql\": \"SELECT name FROM users\"}",
        ]);
        let result = sql_edit(provider.clone(), &sql_edit_request("", "names")).await.unwrap();

        assert_eq!(result["sql"], "SELECT name FROM users");
        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("Here is your query: SELECT name FROM users"));
        assert!(prompts[1].contains("did not satisfy the constraints"));
    }

    #[tokio::test]
    async fn test_structured_chain_falls_back_to_empty_fields() {
        let provider = ScriptedProvider::new(vec!["no idea", "still no idea"]);
        let req = TextToSqlRequest {
            question: "how many users?".to_string(),
            dialect: "MySQL".to_string(),
            table_info: None,
            model_id: None,
            openai_api_key: None,
        };
        let result = text_to_sql(provider.clone(), &req).await.unwrap();

        assert_eq!(result["sql"], "");
        assert_eq!(result["question"], "");
        assert_eq!(result["reasoning"], json!([]));
        assert!(provider.prompts()[0].contains("at most 5 results"));
    }

    #[tokio::test]
    async fn test_structured_chain_repairs_truncated_output() {
        let provider = ScriptedProvider::new(vec!["```json\n{\"spec\": {\"mark\": \"bar\""]);
        let result = vega_spec(
            provider,
            &VegaRequest {
                sql: "SELECT 1".to_string(),
                model_id: None,
                openai_api_key: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(result["spec"], json!({"mark": "bar"}));
    }

    #[test]
    fn test_accumulator_emits_on_change_only() {
        let mut acc = JsonAccumulator::default();
        assert_eq!(acc.push("```json\n"), None);
        assert_eq!(acc.push("{\"sql\": \"SEL"), Some("{\"sql\":\"SEL\"}\n".to_string()));
        assert_eq!(acc.push(""), None);
        assert_eq!(acc.push("ECT"), Some("{\"sql\":\"SELECT\"}\n".to_string()));
        assert_eq!(acc.push("\"}"), None);
        assert_eq!(acc.push("\n```"), None);
    }

    #[tokio::test]
    async fn test_stream_json_lines() {
        let provider = ScriptedProvider::streaming(vec!["{\"source\": \"import ", "pandas as pd", "\"}"]);
        let req = PythonEditRequest {
            source: String::new(),
            instructions: "import pandas".to_string(),
            allowed_libraries: vec!["pandas".to_string(), "numpy".to_string()],
            variables: "df = pd.DataFrame(columns=['a'])".to_string(),
            model_id: None,
            openai_api_key: None,
        };

        let lines: Vec<String> = stream_json_lines(provider.clone(), python_edit_stream_prompt(&req))
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            lines,
            vec![
                "{\"source\":\"import\"}\n".to_string(),
                "{\"source\":\"import pandas as pd\"}\n".to_string(),
            ]
        );
        let prompt = &provider.prompts()[0];
        assert!(prompt.contains("You can only use the following libraries: pandas, numpy"));
        assert!(prompt.contains("global_variables: ```df = pd.DataFrame(columns=['a'])```"));
    }

    #[tokio::test]
    async fn test_stream_json_lines_stops_after_provider_error() {
        let provider = ScriptedProvider::streaming_results(vec![
            Ok("{\"sql\": \"SELECT 1"),
            Err("connection reset"),
            Ok(" FROM users\"}"),
        ]);

        let lines: Vec<String> = stream_json_lines(provider, "prompt".to_string())
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(lines, vec!["{\"sql\":\"SELECT 1\"}\n".to_string()]);
    }

    #[tokio::test]
    async fn test_python_edit_returns_source() {
        let provider = ScriptedProvider::new(vec!["```json\n{\"source\": \"df.plot()\"}\n```"]);
        let req = PythonEditRequest {
            source: "df".to_string(),
            instructions: "plot df".to_string(),
            allowed_libraries: vec!["matplotlib".to_string()],
            variables: String::new(),
            model_id: None,
            openai_api_key: None,
        };
        let result = python_edit(provider.clone(), &req).await.unwrap();

        assert_eq!(result["source"], "df.plot()");
        let prompt = &provider.prompts()[0];
        assert!(prompt.contains("matplotlib"));
        assert!(prompt.contains("\"source\": string  // This is the generated Python code"));
    }

    #[tokio::test]
    async fn test_question_to_sql_uses_table_info() {
        let provider = ScriptedProvider::new(vec!["{\"sql\": \"SELECT count(*) FROM orders\"}"]);
        let req = VannaRequest {
            instructions: "how many orders?".to_string(),
            table_info: Some("CREATE TABLE orders (id int)".to_string()),
            model_id: None,
            openai_api_key: None,
        };
        let result = question_to_sql(provider.clone(), &req).await.unwrap();

        assert_eq!(result["sql"], "SELECT count(*) FROM orders");
        let prompt = &provider.prompts()[0];
        assert!(prompt.contains("how many orders?"));
        assert!(prompt.contains("CREATE TABLE orders (id int)"));
    }

    #[test]
    fn test_sql_edit_stream_prompt_without_table_info() {
        let mut req = sql_edit_request("SELECT * FROM users LIMIT 10", "only names");
        req.table_info = None;
        let prompt = sql_edit_stream_prompt(&req);
        assert!(prompt.contains("Given a PostgreSQL query"));
        assert!(prompt.contains("input_query: ```SELECT * FROM users LIMIT 10```"));
        assert!(!prompt.contains("{table_info}"));
    }
}
