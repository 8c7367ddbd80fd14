//! Prompt templates. Placeholders are `{name}`; braces that do not name a
//! supplied variable are left untouched.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{([a-z_]+)\}").expect("valid placeholder regex");
}

/// Fills every known `{name}` in a single pass, so substituted values are
/// never expanded again.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Number of rows text-to-SQL queries are limited to unless asked otherwise.
pub const DEFAULT_TOP_K: usize = 5;

pub const SQL_EDIT_STREAM: &str = r#"You're an expert in creating queries.

Given a {dialect} query and some instructions on how to manipulate such query, perform the manipulations requested as per the instructions.

When manipulating queries, make sure it's consistent with the style of the code you see in the input query, always maintain the same LIMIT set in the original query unless the user explicitly asks for a LIMIT. If no limit is specified, do not specify one.

When input query is empty or missing, the generated query should be beautifully formatted and indented.

When working with time, always try to return columns as DATETIME.

Pay attention to use only the column names that you can see in the schema description. Be careful to not query for columns that do not exist. Also, pay attention to which column is in which table.

Be aware that you can be asked to query for values that are not present in the sample data.

Only use the following tables:

{table_info}

Take the `input_query` and manipulation `instructions` below delimited by triple backticks and use it to create a new query.

input_query: ```{query}```

instructions: ```{instructions}```

Your response must contain just a JSON object with an `sql` key do not explain your thought process or the steps you took to get to the final query. The `sql` key should contain the final query you created.
"#;

pub const PYTHON_EDIT_STREAM: &str = r#"You're a senior python programmer and data scientist.

Given a source code and some instructions on how to manipulate such code, update the code as requested as per the instructions.

When writing code, make sure it's consistent with the style of the code you see in the source code, preferring the indenting there. If the source code is empty or missing, you should write the code from scratch and indent it beautifully.

You can only use the following libraries: {allowed_libraries}

Take the `input_source` and the manipulation `instructions` below delimited by triple backticks and use them to create the result source.

If necessary, you can use the already existing `global_variables`. Assume these `global_variables` already exist in the context and avoid redefining them, as if you were using the python block of a jupyter notebook.

input_source: ```{source}```

global_variables: ```{variables}```

instructions: ```{instructions}```

Your response must contain just a JSON object with an `source` key.
"#;

pub const SQL_EDIT: &str = r#"You're a senior data analyst, an expert at creating queries.

Given a {dialect} query and some instructions on how to manipulate such query, perform the manipulations requested as per the instructions.

- Always try to come up with a suggestion, even if the instructions are not clear or you're not sure about the answer.
- When manipulating queries, always maintain the same LIMIT set in the original query unless the user explicitly asks for a LIMIT. If no limit is specified, do not specify one.
- You should never include formatting backticks at the start or end of the query, just return the query itself.
- When working with time, always try to return columns as DATETIME.
- If you cannot generate a query suggestion, return an empty string.

Pay attention to use only the column names that you can see in the schema description. Be careful to not query for columns that do not exist. Also, pay attention to which column is in which table.

Only use the following tables:

{table_info}

Take the input query and manipulation instructions below delimited by triple backticks and use it to create a new query.

input query: ```{query}```

manipulation instructions: ```{instructions}```

{format_instructions}
"#;

pub const PYTHON_EDIT: &str = r#"You're a senior python programmer and data scientist.

Given a source code and some instructions on how to manipulate such code, update the code as requested as per the instructions.

- When writing code, make sure it's consistent with the style of the code you see in the source code.
- Always try to come up with a code suggestion, even if the instructions are not clear or you're not sure about the answer.
- You should never include formatting backticks at the start or end of the code suggestion, just return the code suggestion itself.
- If you cannot generate a code suggestion, return an empty string.

You can only use the following libraries: {allowed_libraries}

Take the input source and manipulation instructions below delimited by triple backticks and use it to create a new source.

input source: ```{source}```

manipulation instructions: ```{instructions}```

{format_instructions}
"#;

pub const TEXT_TO_SQL: &str = r#"Given an input question, first create a syntactically correct {dialect} query, then return the query the reasoning behind it. The reasoning should be more high level, don't explain SQL syntax but mention tables, columns and relations. Unless the user specifies in his question a specific number of examples he wishes to obtain, always limit your query to at most {top_k} results using the LIMIT clause. You can order the results by a relevant column to return the most interesting examples in the database.

When working with time, always try to return columns as DATETIME.

Never query for all the columns from a specific table, only ask for a the few relevant columns given the question.

Pay attention to use only the column names that you can see in the schema description. Be careful to not query for columns that do not exist. Also, pay attention to which column is in which table.

Only use the following tables:

{table_info}

Take the input question below delimited by triple backticks and use it to create the query and reasoning.

input question: ```{question}```

{format_instructions}
"#;

pub const VEGA: &str = r#"Given a SQL query, create a vega lite spec to visualize the data the query returns.

The spec must be valid json, omit the "data" property.
The spec should come with a descriptive title of the chart.

Take the SQL query below delimited by triple backticks and use it to create the vega lite spec.

sql: ```{sql}```

{format_instructions}
"#;

pub const QUESTION_TO_SQL: &str = r#"You're a SQL expert. Write a query that answers the question below using only the tables described in the context.

===Tables
{table_info}

===Response guidelines
1. If the context is sufficient, write a valid query without explanations.
2. If the context is insufficient, answer with an empty query.
3. Use the most relevant tables.
4. Make sure the query is syntactically correct and can be executed as is.

question: ```{instructions}```

{format_instructions}
"#;

/// Sent when a completion does not match the format instructions.
pub const OUTPUT_FIX: &str = r#"Instructions:
--------------
{instructions}
--------------
Completion:
--------------
{completion}
--------------

Above, the Completion did not satisfy the constraints given in the Instructions.
Error:
--------------
{error}
--------------

Please try again. Please only respond with an answer that satisfies the constraints laid out in the Instructions:"#;
