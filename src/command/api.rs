use crate::common::*;

use std::str::FromStr;

use crate::api::ApiClient;
use crate::error::Error;

#[derive(StructOpt, Debug)]
pub struct ApiOptions {
    /// HTTP method, `get`, `post` or `patch`
    #[structopt(name = "METHOD")]
    method: Method,
    /// Path under the API host, e.g., `api/v1/pools/123`
    #[structopt(name = "URL_SUFFIX")]
    url_suffix: String,
    /// Query parameter for `get`, e.g., `status=OPEN`
    #[structopt(short = "p", long = "param", number_of_values = 1)]
    params: Vec<QueryParam>,
    /// JSON body for `post` and `patch`
    #[structopt(short = "d", long = "data")]
    data: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Post,
    Patch,
}

impl FromStr for Method {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Method::Get),
            "post" => Ok(Method::Post),
            "patch" => Ok(Method::Patch),
            _ => Err(anyhow::anyhow!("Unsupported method: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueryParam(String, String);

impl FromStr for QueryParam {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .with_context(|| format!("Expected `KEY=VALUE`, got {:?}", s))?;
        anyhow::ensure!(!key.is_empty(), "Empty parameter name in {:?}", s);

        Ok(QueryParam(key.to_owned(), value.to_owned()))
    }
}

pub struct ApiCommand;

impl CommandType for ApiCommand {
    type Options = ApiOptions;

    fn run(_opt: &Options, config: &Config, api_opt: &Self::Options) -> Result<()> {
        let client = ApiClient::new(&config.api)?;
        let body: serde_json::Value = match &api_opt.data {
            Some(data) => serde_json::from_str(data).context("Failed to parse --data as JSON")?,
            None => serde_json::Value::Object(Default::default()),
        };

        let (method, resp) = match api_opt.method {
            Method::Get => {
                let params: Vec<(String, String)> = api_opt
                    .params
                    .iter()
                    .map(|QueryParam(k, v)| (k.clone(), v.clone()))
                    .collect();
                ("GET", client.get(&api_opt.url_suffix, &params)?)
            }
            Method::Post => ("POST", client.post(&api_opt.url_suffix, &body)?),
            Method::Patch => ("PATCH", client.patch(&api_opt.url_suffix, &body)?),
        };

        let status = resp.status();
        tracing::info!("{} {} -> {}", method, api_opt.url_suffix, status);
        let resp = Error::check_status(method, resp)?;
        println!("{}", resp.text()?);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arguments() {
        assert_eq!("PATCH".parse::<Method>().unwrap(), Method::Patch);
        assert!("delete".parse::<Method>().is_err());

        assert_eq!(
            "status=OPEN".parse::<QueryParam>().unwrap(),
            QueryParam("status".to_owned(), "OPEN".to_owned())
        );
        assert_eq!(
            "q=a=b".parse::<QueryParam>().unwrap(),
            QueryParam("q".to_owned(), "a=b".to_owned())
        );
        assert!("novalue".parse::<QueryParam>().is_err());
        assert!("=x".parse::<QueryParam>().is_err());
    }
}
