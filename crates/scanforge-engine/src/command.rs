//! Scanner command-line construction.
//!
//! The flag names below are the invoked tool's CLI contract (nuclei-style):
//! `-json` selects newline-delimited JSON output, `-rl`/`-c` carry rate limit
//! and concurrency, `-proxy` and `-interactsh-url` carry the network options,
//! and each template/target is passed as a repeated `-t`/`-target` flag.
//! Targets go on the command line rather than through a list file.

use crate::settings::Settings;
use scanforge_core::ScanOptions;
use std::path::PathBuf;

/// Build the scanner argument list for one task.
///
/// Task options win; unset numeric and network options fall back to the
/// defaults captured in `settings`. Options without a value are omitted
/// entirely - one flag per option.
pub fn build_scan_args(
    settings: &Settings,
    targets: &[String],
    template_paths: &[PathBuf],
    options: &ScanOptions,
) -> Vec<String> {
    let mut args = vec!["-json".to_string()];

    let rate_limit = options.rate_limit.unwrap_or(settings.default_rate_limit);
    if rate_limit > 0 {
        args.push("-rl".to_string());
        args.push(rate_limit.to_string());
    }

    let concurrency = options.concurrency.unwrap_or(settings.default_concurrency);
    if concurrency > 0 {
        args.push("-c".to_string());
        args.push(concurrency.to_string());
    }

    if let Some(severity) = &options.severity {
        args.push("-severity".to_string());
        args.push(severity.clone());
    }

    let proxy = options
        .proxy
        .as_deref()
        .or_else(|| settings.proxy.preferred());
    if let Some(proxy) = proxy {
        args.push("-proxy".to_string());
        args.push(proxy.to_string());
    }

    let interactsh = options
        .interactsh_url
        .as_deref()
        .or_else(|| settings.interactsh_default());
    if let Some(addr) = interactsh {
        args.push("-interactsh-url".to_string());
        args.push(addr.to_string());
    }

    for template in template_paths {
        args.push("-t".to_string());
        args.push(template.display().to_string());
    }

    for target in targets {
        args.push("-target".to_string());
        args.push(target.clone());
    }

    if let Some(output) = &options.output_path {
        args.push("-o".to_string());
        args.push(output.display().to_string());
    }

    args
}
