//! Composes the `make-greeting` result from a job's variables and headers.

use serde::{Deserialize, Serialize};

/// A greeting input that is missing or not a string.
#[derive(thiserror::Error, Debug)]
pub enum GreetingError {
    /// `name` is not a string variable of the job.
    #[error("job variables carry no usable `name`: {0}")]
    Name(#[source] serde_json::Error),
    /// `greeting` is not a string custom header of the job.
    #[error("job headers carry no usable `greeting`: {0}")]
    Greeting(#[source] serde_json::Error),
}

/// Variables the `make-greeting` job completes with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetingResult {
    /// The composed greeting
    pub say: String,
}

#[derive(Deserialize)]
struct Variables {
    name: String,
}

#[derive(Deserialize)]
struct Headers {
    greeting: String,
}

/// Join the `greeting` header and the `name` variable with a single space.
///
/// Both arguments are the JSON documents the gateway hands out with a job.
pub fn compose_greeting(variables: &str, headers: &str) -> Result<GreetingResult, GreetingError> {
    let Variables { name } = serde_json::from_str(or_empty(variables)).map_err(GreetingError::Name)?;
    let Headers { greeting } =
        serde_json::from_str(or_empty(headers)).map_err(GreetingError::Greeting)?;

    Ok(GreetingResult {
        say: format!("{} {}", greeting, name),
    })
}

fn or_empty(document: &str) -> &str {
    if document.trim().is_empty() {
        "{}"
    } else {
        document
    }
}
