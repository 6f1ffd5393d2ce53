use indicatif::{ProgressBar, ProgressStyle};

pub const DEFAULT_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({per_sec}) {msg}";

/// Bar sized to `length`, or a hidden one when progress output is off.
pub fn create_progress_bar(length: u64, description: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(length);
    match ProgressStyle::default_bar().template(DEFAULT_TEMPLATE) {
        Ok(style) => pb.set_style(style.progress_chars("#>-")),
        Err(e) => tracing::debug!("Falling back to default progress style: {}", e),
    }
    pb.set_message(description.to_string());
    pb
}
