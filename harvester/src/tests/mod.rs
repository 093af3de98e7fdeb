pub mod mock;

use crate::config::{PipelineConfig, TimeoutConfig};
use std::path::Path;

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_test_writer()
        .try_init();
}

/// Default portal settings with every wait collapsed, downloads in
/// `workdir/downloads` and the archive in `workdir/archive`.
pub fn test_config(workdir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig {
        timeouts: TimeoutConfig::immediate(),
        ..PipelineConfig::default()
    };
    config.browser.download_dir = workdir.join("downloads");
    config.archive.dest_dir = workdir.join("archive");
    config.diagnostics.dir = workdir.join("diagnostics");
    config.download.poll_interval_secs = 1;
    config.download.max_wait_secs = 0;
    config.export.keyboard_pause_ms = 0;
    config
}

pub const IDENTITY_URL: &str = "https://login.app.redbeam.com/u/login/identifier?state=abc";
pub const APP_URL: &str = "https://app.redbeam.com/g/0/home";

pub struct LoginPage {
    pub identifier: mock::NodeId,
    pub password: mock::NodeId,
    pub submit: mock::NodeId,
}

/// Hosted two-step login: the entry URL redirects to the identity page,
/// the first submit reveals the password field and the second lands on
/// the application.
pub fn login_page(browser: &mock::MockBrowser, config: &PipelineConfig) -> LoginPage {
    use mock::{Action, MockNode};

    browser.redirect(&config.portal.login_url, IDENTITY_URL);
    let identifier = browser.add(
        MockNode::new("input")
            .attr("name", "username")
            .attr("type", "email"),
    );
    let password = browser.add(
        MockNode::new("input")
            .attr("name", "password")
            .attr("type", "password")
            .hidden(),
    );
    let submit = browser.add(
        MockNode::new("button")
            .attr("type", "submit")
            .text("Continue"),
    );
    browser.route("input[name='username']", &[identifier]);
    browser.route("input[name='password']", &[password]);
    browser.route("input[type='password']", &[password]);
    browser.route("button[type='submit']", &[submit]);
    browser.on_activate(submit, vec![Action::Reveal(password)]);
    browser.on_activate(submit, vec![Action::SetUrl(APP_URL.to_string())]);
    LoginPage {
        identifier,
        password,
        submit,
    }
}

pub struct ReportPage {
    pub export_button: mock::NodeId,
    pub csv_item: mock::NodeId,
}

/// Report header with a "Records" title and an icon-only export button
/// whose menu holds a CSV entry.
pub fn report_page(browser: &mock::MockBrowser) -> ReportPage {
    use mock::{Action, MockNode};

    let header = browser.add(MockNode::new("div").attr("class", "report-header"));
    browser.add(MockNode::new("span").text("Records").under(header));
    let export_button = browser.add(
        MockNode::new("button")
            .attr("class", "btn export-button")
            .under(header),
    );
    browser.add(
        MockNode::new("svg")
            .markup("<svg viewBox=\"0 0 24 24\"><path d=\"M5 20h14v-2H5z\"></path></svg>")
            .under(export_button),
    );
    let csv_item = browser.add(
        MockNode::new("li")
            .attr("role", "menuitem")
            .text("CSV")
            .hidden(),
    );
    browser.on_activate(export_button, vec![Action::Reveal(csv_item)]);
    browser.route(crate::export::format_label_selector("CSV"), &[csv_item]);
    ReportPage {
        export_button,
        csv_item,
    }
}
