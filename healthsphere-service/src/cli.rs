//! Terminal rendering of both modes, shared by the `healthsphere-cli` binary.

use anyhow::{Context as _, Result};
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    Mode, Presenter, PresenterError,
    upload::{UploadedFile, mime_for_path},
};

pub const QUIT_COMMAND: &str = "/quit";

/// Read a local report image. Files with an unknown extension are passed on
/// untyped so the upload check rejects them.
pub async fn read_upload(path: &Path) -> Result<UploadedFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let content_type = mime_for_path(path).unwrap_or("application/octet-stream");
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(UploadedFile::new(file_name, content_type, bytes))
}

async fn write_failure<W>(out: &mut W, err: &PresenterError) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = if err.is_generic() {
        format!("{}: {}\n", err.user_message(), err)
    } else {
        format!("{}\n", err.user_message())
    };
    out.write_all(line.as_bytes()).await?;
    Ok(())
}

/// Run one report analysis and render it. Returns whether the analysis succeeded.
pub async fn run_analyze<W>(
    presenter: &Presenter,
    image: Option<&Path>,
    query: &str,
    out: &mut W,
) -> Result<bool>
where
    W: AsyncWrite + Unpin,
{
    let view = Mode::ReportAnalysis.view();
    out.write_all(format!("{}\n\n", view.subheader).as_bytes())
        .await?;

    let upload = match image {
        Some(path) => Some(read_upload(path).await?),
        None => None,
    };

    match presenter.report.analyze(query, upload).await {
        Ok(outcome) => {
            let rendered = format!(
                "[{}: {} ({}x{})]\n\n{}\n{}\n{}\n",
                outcome.image.caption,
                outcome.image.file_name,
                outcome.image.width,
                outcome.image.height,
                outcome.subheader,
                "─".repeat(outcome.subheader.chars().count()),
                outcome.response
            );
            out.write_all(rendered.as_bytes()).await?;
            Ok(true)
        }
        Err(e) => {
            write_failure(out, &e).await?;
            Ok(false)
        }
    }
}

/// Chat over `input` line by line until `/quit` or end of input, then end the session.
/// Blank lines are ignored.
pub async fn run_chat<R, W>(presenter: &Presenter, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let view = Mode::Chat.view();
    out.write_all(format!("{}\n{}\n\n", view.subheader, view.description).as_bytes())
        .await?;

    let chat = &presenter.chat;
    let session_id = chat.start().await?;
    let mut lines = input.lines();

    loop {
        out.write_all(b"you> ").await?;
        out.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line == QUIT_COMMAND {
            break;
        }
        if line.is_empty() {
            continue;
        }

        match chat.send(&session_id, line).await {
            Ok(reply) => {
                out.write_all(format!("assistant> {}\n\n", reply.reply).as_bytes())
                    .await?
            }
            Err(e) => write_failure(out, &e).await?,
        }
    }

    chat.end(&session_id).await?;
    out.flush().await?;
    Ok(())
}
