//! HTTP downloads and page fetches

use super::{TaskContext, TaskOutput};
use crate::error::{Error, Result};
use crate::progress::{ProgressPacer, ProgressReporter};
use crate::types::TransferCounters;
use crate::utils::{bounded_text, part_path};
use futures::StreamExt;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use std::path::Path;
use tokio::io::AsyncWriteExt;

fn check_status(response: &reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(Error::HttpStatus {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}

pub(crate) async fn download(
    ctx: &TaskContext,
    url: &str,
    local_path: &Path,
    reporter: Option<ProgressReporter>,
) -> Result<TaskOutput> {
    let response = ctx.client.get(url).send().await?;
    check_status(&response)?;

    if let Some(parent) = local_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let part = part_path(local_path);
    let mut pacer = ProgressPacer::new(reporter, ctx.settings.progress_interval());
    let written = match write_body(response, &part, &mut pacer).await {
        Ok(counters) => tokio::fs::rename(&part, local_path)
            .await
            .map(|_| counters)
            .map_err(Error::from),
        Err(e) => Err(e),
    };
    match written {
        Ok(counters) => {
            log::debug!("Downloaded {} to {:?}", url, local_path);
            Ok(TaskOutput {
                counters,
                ..Default::default()
            })
        }
        Err(e) => {
            if let Err(remove_err) = tokio::fs::remove_file(&part).await {
                log::debug!("Could not remove partial file {:?}: {}", part, remove_err);
            }
            Err(e)
        }
    }
}

async fn write_body(
    response: reqwest::Response,
    part: &Path,
    pacer: &mut ProgressPacer,
) -> Result<TransferCounters> {
    let mut counters = TransferCounters {
        download_total: response.content_length().unwrap_or(0),
        ..Default::default()
    };

    let mut file = tokio::fs::File::create(part).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        counters.download_now += chunk.len() as u64;
        counters.download_total = counters.download_total.max(counters.download_now);
        pacer.update(counters);
    }
    file.flush().await?;
    file.sync_all().await?;

    pacer.finish(counters);
    Ok(counters)
}

pub(crate) async fn fetch_page(
    ctx: &TaskContext,
    url: &str,
    post_body: &str,
    user_agent: &str,
) -> Result<TaskOutput> {
    let mut request = if post_body.is_empty() {
        ctx.client.get(url)
    } else {
        ctx.client
            .post(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(post_body.to_string())
    };
    if !user_agent.is_empty() {
        request = request.header(USER_AGENT, user_agent);
    }

    let response = request.send().await?;
    check_status(&response)?;

    let capacity = ctx.settings.result_capacity;
    let mut counters = TransferCounters {
        download_total: response.content_length().unwrap_or(0),
        upload_total: post_body.len() as u64,
        upload_now: post_body.len() as u64,
        ..Default::default()
    };

    // Only keep what fits; the rest of the body is left unread.
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        counters.download_now += chunk.len() as u64;
        let room = capacity.saturating_sub(body.len());
        body.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if body.len() >= capacity {
            break;
        }
    }

    Ok(TaskOutput {
        text: bounded_text(&body, capacity),
        counters,
        ..Default::default()
    })
}
