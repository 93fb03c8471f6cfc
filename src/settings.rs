//! Value types describing how a single render should be laid out and how
//! long to wait for the page's JavaScript to signal readiness.

use std::time::Duration;

/// Page orientation, mapped to CDP's `landscape` boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Layout of the generated PDF page. Immutable for the lifetime of one
/// request.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSettings {
    pub orientation: Orientation,
    pub paper_width_inches: f64,
    pub paper_height_inches: f64,
    pub margin_top_inches: f64,
    pub margin_bottom_inches: f64,
    pub margin_left_inches: f64,
    pub margin_right_inches: f64,
    pub print_background: bool,
    pub header_template: Option<String>,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            orientation: Orientation::Portrait,
            paper_width_inches: 8.5,
            paper_height_inches: 11.0,
            margin_top_inches: 0.4,
            margin_bottom_inches: 0.4,
            margin_left_inches: 0.4,
            margin_right_inches: 0.4,
            print_background: true,
            header_template: None,
        }
    }
}

impl PageSettings {
    /// Builds the `Page.printToPDF` parameter object, field-for-field
    /// compatible with CDP (spec §6). Always requests `ReturnAsStream`.
    pub fn to_print_params(&self) -> serde_json::Value {
        let mut params = serde_json::json!({
            "landscape": self.orientation == Orientation::Landscape,
            "paperWidth": self.paper_width_inches,
            "paperHeight": self.paper_height_inches,
            "marginTop": self.margin_top_inches,
            "marginBottom": self.margin_bottom_inches,
            "marginLeft": self.margin_left_inches,
            "marginRight": self.margin_right_inches,
            "printBackground": self.print_background,
            "transferMode": "ReturnAsStream",
        });
        if let Some(template) = &self.header_template {
            params["displayHeaderFooter"] = serde_json::Value::Bool(true);
            params["headerTemplate"] = serde_json::Value::String(template.clone());
        }
        params
    }
}

/// Controls whether and how long the render pipeline waits for a
/// window-level JavaScript completion flag before printing to PDF.
#[derive(Debug, Clone, PartialEq)]
pub struct JsSettings {
    pub wait_for_completion: bool,
    pub completion_timeout: Duration,
    pub readiness_flag_name: String,
}

impl JsSettings {
    pub const DEFAULT_FLAG_NAME: &'static str = "reportIsReady";

    /// No JS wait, for callers that just want the HTML rendered as-is.
    pub fn disabled() -> Self {
        Self {
            wait_for_completion: false,
            completion_timeout: Duration::from_secs(3),
            readiness_flag_name: Self::DEFAULT_FLAG_NAME.to_string(),
        }
    }

    pub fn wait(completion_timeout: Duration) -> Self {
        Self {
            wait_for_completion: true,
            completion_timeout,
            readiness_flag_name: Self::DEFAULT_FLAG_NAME.to_string(),
        }
    }

    /// Builds the `Runtime.evaluate` expression that polls
    /// `window[readiness_flag_name]` until it is truthy or the timeout
    /// elapses, resolving to `"Signal received"` on success.
    pub fn readiness_expression(&self) -> String {
        let flag = &self.readiness_flag_name;
        let timeout_ms = self.completion_timeout.as_millis();
        format!(
            "new Promise((resolve) => {{\n\
                 const deadline = Date.now() + {timeout_ms};\n\
                 const poll = () => {{\n\
                     if (window['{flag}']) {{ resolve('Signal received'); return; }}\n\
                     if (Date.now() >= deadline) {{ resolve('timeout'); return; }}\n\
                     setTimeout(poll, 25);\n\
                 }};\n\
                 poll();\n\
             }})"
        )
    }
}

impl Default for JsSettings {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let settings = PageSettings::default();
        assert_eq!(settings.orientation, Orientation::Portrait);
        assert_eq!(settings.paper_width_inches, 8.5);
        assert_eq!(settings.paper_height_inches, 11.0);
        assert_eq!(settings.margin_top_inches, 0.4);
        assert!(settings.print_background);
        assert!(settings.header_template.is_none());
    }

    #[test]
    fn header_template_sets_display_header_footer() {
        let mut settings = PageSettings::default();
        settings.header_template = Some("<span>hi</span>".to_string());
        let params = settings.to_print_params();
        assert_eq!(params["displayHeaderFooter"], true);
        assert_eq!(params["headerTemplate"], "<span>hi</span>");
    }

    #[test]
    fn print_background_inverts_into_cdp_field() {
        let mut settings = PageSettings::default();
        settings.print_background = false;
        let params = settings.to_print_params();
        assert_eq!(params["printBackground"], false);
    }

    #[test]
    fn default_readiness_flag_matches_spec() {
        assert_eq!(JsSettings::DEFAULT_FLAG_NAME, "reportIsReady");
        assert_eq!(
            JsSettings::default().readiness_flag_name,
            "reportIsReady"
        );
    }
}
