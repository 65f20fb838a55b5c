use crate::common::*;

use reqwest::blocking::Response;

use crate::api::{
    ApiClient,
    Verdict,
};
use crate::pool::map_progress;

#[derive(StructOpt, Debug)]
pub struct AcceptOptions {
    /// Assignment ids
    #[structopt(name = "ASSIGNMENT", required = true)]
    assignments: Vec<String>,
}

#[derive(StructOpt, Debug)]
pub struct RejectOptions {
    /// Assignment ids
    #[structopt(name = "ASSIGNMENT", required = true)]
    assignments: Vec<String>,
    /// Public comment shown to the worker
    #[structopt(long = "comment")]
    comment: String,
}

#[derive(StructOpt, Debug)]
pub struct VerdictOptions {
    /// Assignment id
    #[structopt(name = "ASSIGNMENT")]
    assignment: String,
    /// New status, `accepted` or `rejected`
    #[structopt(name = "STATUS")]
    status: Verdict,
    /// Public comment shown to the worker
    #[structopt(long = "comment", default_value = "")]
    comment: String,
}

/// Post the same verdict for every assignment, in parallel.
fn post_verdicts<P>(opt: &Options, config: &Config, assignments: &[String], verdict: Verdict, post: P) -> Result<()>
where
    P: Fn(&ApiClient, &str) -> Result<Response> + Send + Sync + 'static,
{
    let client = Arc::new(ApiClient::new(&config.api)?);
    let pool = crate::pool::create(opt.threads)?;
    let started = Instant::now();

    let done = map_progress(&pool, assignments.to_vec(), move |assignment: String| {
        post(&client, &assignment)
            .with_context(|| format!("Failed to post verdict for {}", assignment))
            .map(|_| ())
    })?;

    tracing::info!(
        "Marked {} assignments {} in {}",
        done.len(),
        verdict,
        HumanDuration(started.elapsed())
    );

    Ok(())
}

pub struct AcceptCommand;

impl CommandType for AcceptCommand {
    type Options = AcceptOptions;

    fn run(opt: &Options, config: &Config, acc_opt: &Self::Options) -> Result<()> {
        post_verdicts(
            opt,
            config,
            &acc_opt.assignments,
            Verdict::Accepted,
            |client, assignment| client.accept(assignment),
        )
    }
}

pub struct RejectCommand;

impl CommandType for RejectCommand {
    type Options = RejectOptions;

    fn run(opt: &Options, config: &Config, rej_opt: &Self::Options) -> Result<()> {
        anyhow::ensure!(
            !rej_opt.comment.trim().is_empty(),
            "A rejection needs a comment for the worker"
        );
        let comment = rej_opt.comment.clone();
        post_verdicts(
            opt,
            config,
            &rej_opt.assignments,
            Verdict::Rejected,
            move |client, assignment| client.reject(assignment, &comment),
        )
    }
}

pub struct VerdictCommand;

impl CommandType for VerdictCommand {
    type Options = VerdictOptions;

    fn run(_opt: &Options, config: &Config, v_opt: &Self::Options) -> Result<()> {
        let comment = match (v_opt.status, v_opt.comment.as_str()) {
            (Verdict::Accepted, "") => crate::api::ACCEPT_COMMENT,
            (Verdict::Rejected, "") => anyhow::bail!("A rejection needs a comment for the worker"),
            (_, comment) => comment,
        };

        ApiClient::new(&config.api)?.make_verdict(&v_opt.assignment, v_opt.status, comment)?;

        Ok(())
    }
}
