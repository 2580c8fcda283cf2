//! Payload to [`Scraper`] compilation

use std::collections::HashSet;
use std::sync::Arc;

use scraper::Selector;
use tracing::{debug, warn};

use super::{Divider, Paginator, Part, Scraper, SELF_SELECTOR};
use crate::config::Config;
use crate::error::{BadPayloadKind, Error, Result};
use crate::extractors;
use crate::fetch::Request;
use crate::payload::{Field, Payload, PaginatorSpec};

/// Compile a payload into its execution plan.
///
/// Structural problems are reported before anything is fetched. Unknown
/// extractor types are skipped with a warning.
pub fn compile(payload: &Payload, config: &Config) -> Result<Scraper> {
    let mut request = payload.request.clone();
    request.retries = payload.retry_times;
    compile_level(&payload.fields, payload.paginator.as_ref(), request, config)
}

fn compile_level(
    fields: &[Field],
    paginator: Option<&PaginatorSpec>,
    mut request: Request,
    config: &Config,
) -> Result<Scraper> {
    let infinite_scroll = paginator.is_some_and(|p| p.infinite_scroll);
    request.infinite_scroll = infinite_scroll;

    let mut parts = Vec::new();
    let mut names = HashSet::new();
    for (index, field) in fields.iter().enumerate() {
        let name = field.name.trim();
        if name.is_empty() {
            return Err(BadPayloadKind::NoName { index }.into());
        }
        let selector = field.selector.trim();
        if selector.is_empty() {
            return Err(BadPayloadKind::NoSelector {
                name: name.to_string(),
            }
            .into());
        }
        let compiled = if selector == SELF_SELECTOR {
            None
        } else {
            Some(parse_selector(selector)?)
        };

        // Detail URLs are only known at run time; the request is a placeholder
        let details = field
            .details
            .as_ref()
            .map(|d| compile_level(&d.fields, d.paginator.as_ref(), request.clone(), config))
            .transpose()?
            .map(Arc::new);
        let mut details_attached = false;

        for kind in &field.extractor.types {
            let Some(extractor) = extractors::build(name, kind, &field.extractor)? else {
                warn!(field = name, extractor = %kind, "unknown extractor type, skipping");
                continue;
            };
            let part_name = format!("{name}_{kind}");
            if !names.insert(part_name.clone()) {
                return Err(BadPayloadKind::DuplicateName { name: part_name }.into());
            }
            let part_details = if is_link_kind(kind) {
                details_attached = true;
                details.clone()
            } else {
                None
            };
            parts.push(Part {
                name: part_name,
                selector: selector.to_string(),
                compiled: compiled.clone(),
                extractor,
                details: part_details,
            });
        }

        if details.is_some() && !details_attached {
            warn!(field = name, "details need an href or src extractor, ignoring");
        }
    }

    if parts.is_empty() {
        return Err(BadPayloadKind::NoParts.into());
    }

    let scraper = Scraper {
        request,
        divider: divider_for(&parts),
        parts: parts.into(),
        paginator: paginator_for(paginator)?,
        max_pages: match paginator {
            Some(p) if p.max_pages > 0 => p.max_pages,
            Some(_) => config.default_max_pages,
            None => 1,
        },
        infinite_scroll,
    };
    debug!(parts = ?scraper.part_names(), max_pages = scraper.max_pages, "compiled scraper");
    Ok(scraper)
}

fn is_link_kind(kind: &str) -> bool {
    kind.eq_ignore_ascii_case("href") || kind.eq_ignore_ascii_case("src")
}

fn parse_selector(source: &str) -> Result<Selector> {
    Selector::parse(source).map_err(|_| Error::InvalidSelector {
        selector: source.to_string(),
    })
}

/// Whole document when every part selects the block itself, otherwise
/// common-ancestor division over the distinct part selectors.
fn divider_for(parts: &[Part]) -> Divider {
    let mut seen = HashSet::new();
    let selectors: Vec<Selector> = parts
        .iter()
        .filter(|p| seen.insert(p.selector.as_str()))
        .filter_map(|p| p.compiled.clone())
        .collect();
    if selectors.is_empty() {
        Divider::WholeDocument
    } else {
        Divider::Intersection(selectors)
    }
}

fn paginator_for(spec: Option<&PaginatorSpec>) -> Result<Paginator> {
    match spec {
        Some(spec) if !spec.selector.trim().is_empty() => Ok(Paginator::BySelector {
            selector: parse_selector(spec.selector.trim())?,
            attr: if spec.attr.trim().is_empty() {
                "href".to_string()
            } else {
                spec.attr.trim().to_string()
            },
        }),
        _ => Ok(Paginator::Dummy),
    }
}
