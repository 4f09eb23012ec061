//! Top-level download entry points.
//!
//! These tie the stages together: course selection → subject selection →
//! marks extraction → pagination → document assembly. They assume an
//! already-authenticated [`PortalClient`] (see [`crate::portal::auth::login`]).
//!
//! The whole flow is strictly sequential — every exchange consumes hidden
//! state produced by the previous one, so there is nothing to parallelize
//! within one subject. Distinct subjects are independent, but runs sharing
//! one client must still serialize their postbacks: the server keeps exactly
//! one live state set per session.

use crate::error::Result;
use crate::output::SubjectDownload;
use crate::portal::client::PortalClient;
use crate::portal::paginate::PaginationEngine;
use crate::portal::select::{self, ResourceHandle};
use crate::portal::extract;
use crate::sink::{DocumentSink, TableRenderer};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Download one subject's script out of an existing course-selection
/// response.
///
/// The marks breakdown is additive: if the portal rendered one it is
/// extracted, and — when a `renderer` is supplied — rendered and handed to
/// the sink as a cover page. Its absence, or a render failure, never stops
/// the pages.
///
/// `finalize` runs only when at least one page was retrieved; a zero-page
/// run returns an empty summary the caller can warn about (or escalate via
/// [`SubjectDownload::into_result`]).
pub async fn download_subject(
    client: &PortalClient,
    course: &ResourceHandle,
    subject: &ResourceHandle,
    course_response: &str,
    sink: &mut dyn DocumentSink,
    renderer: Option<&dyn TableRenderer>,
) -> Result<SubjectDownload> {
    let start = Instant::now();

    let (subject_response, state) =
        select::select_subject(client, course, subject, course_response).await?;

    // ── Marks breakdown (purely additive) ────────────────────────────────
    let marks = extract::extract_marks(&subject_response);
    match (&marks, renderer) {
        (Some(record), Some(renderer)) => match renderer.render(&record.header, &record.values) {
            Ok(cover) => sink.accept_cover(cover),
            Err(e) => warn!(error = %e, "marks table render failed; continuing without cover"),
        },
        (Some(_), None) => debug!("marks table extracted; no renderer supplied"),
        (None, _) => debug!("no marks table for this subject"),
    }

    // ── Pages ────────────────────────────────────────────────────────────
    let engine = PaginationEngine::new(client, client.config(), &course.id)?;
    let run = engine.run(subject_response, state, sink).await?;

    let document = if run.pages > 0 {
        Some(sink.finalize(&subject.code).await?)
    } else {
        warn!(subject = subject.code.as_str(), "no pages retrieved");
        None
    };

    info!(
        subject = subject.code.as_str(),
        pages = run.pages,
        stop = %run.stop,
        "subject download finished"
    );

    Ok(SubjectDownload {
        subject_code: subject.code.clone(),
        subject_name: subject.name.clone(),
        pages: run.pages,
        stop: run.stop,
        marks,
        document,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Select `course`, find `subject_code` in its grid, and download it.
pub async fn download_one(
    client: &PortalClient,
    course: &ResourceHandle,
    subject_code: &str,
    sink: &mut dyn DocumentSink,
    renderer: Option<&dyn TableRenderer>,
) -> Result<SubjectDownload> {
    let course_response = select::select_course(client, course).await?;
    let subjects = select::list_subjects(&course_response)?;
    let subject = select::find_handle(&subjects, subject_code)?;
    download_subject(client, course, subject, &course_response, sink, renderer).await
}

/// Download every subject listed under `course`.
///
/// Each subject gets a fresh sink from `make_sink` and a fresh course
/// selection — the previous subject's pagination invalidated the grid's
/// trigger state. One subject failing is logged and recorded; the batch
/// carries on.
pub async fn download_all<F>(
    client: &PortalClient,
    course: &ResourceHandle,
    mut make_sink: F,
    renderer: Option<&dyn TableRenderer>,
) -> Result<Vec<(String, Result<SubjectDownload>)>>
where
    F: FnMut(&ResourceHandle) -> Box<dyn DocumentSink>,
{
    let course_response = select::select_course(client, course).await?;
    let subjects = select::list_subjects(&course_response)?;
    info!(count = subjects.len(), "downloading all subjects");

    let mut results = Vec::with_capacity(subjects.len());
    for (i, subject) in subjects.iter().enumerate() {
        info!(
            subject = subject.code.as_str(),
            progress = i + 1,
            total = subjects.len(),
            "starting subject"
        );
        let outcome = async {
            let course_response = select::select_course(client, course).await?;
            let mut sink = make_sink(subject);
            download_subject(
                client,
                course,
                subject,
                &course_response,
                sink.as_mut(),
                renderer,
            )
            .await
        }
        .await;

        if let Err(ref e) = outcome {
            error!(
                subject = subject.code.as_str(),
                error = %e,
                "subject failed; continuing with the next one"
            );
        }
        results.push((subject.code.clone(), outcome));
    }

    Ok(results)
}
