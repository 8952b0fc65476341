#[cfg(test)]
mod tests {
    use crate::cli::Cli;
    use crate::config::{self, ConfigError, Settings};
    use crate::console::SharedBuffer;
    use crate::feed::Feed;
    use crate::fixtures::*;
    use crate::notify::{Notifier, RecordingNotifier};
    use crate::observers::default_observers;
    use crate::types::ResourceKind;
    use crate::utils::{self, Palette};
    use clap::Parser;
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;

    const SINCE: &str = "2024-03-01T10:00:00Z";

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_cli_parsing_defaults() {
        let cli = Cli::try_parse_from(["kubectl-watchdog", "--api", "api.example:6443"]).unwrap();
        assert_eq!(cli.api, Some("api.example:6443".to_string()));
        assert_eq!(cli.token, "~/token");
        assert!(cli.namespace.is_none());
        assert!(cli.color_enabled());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_parsing_namespace() {
        let cli = Cli::try_parse_from(["kubectl-watchdog", "-n", "shop"]).unwrap();
        assert_eq!(cli.namespace, Some("shop".to_string()));
    }

    #[test]
    fn test_cli_parsing_no_color() {
        let cli = Cli::try_parse_from(["kubectl-watchdog", "--no-color"]).unwrap();
        assert!(!cli.color_enabled());
    }

    #[test]
    fn test_cli_parsing_last_color_flag_wins() {
        let cli = Cli::try_parse_from(["kubectl-watchdog", "--no-color", "--color"]).unwrap();
        assert!(cli.color_enabled());
    }

    #[test]
    fn test_cli_parsing_ca_store() {
        let cli = Cli::try_parse_from(["kubectl-watchdog", "--ca-store", "/etc/ca.pem"]).unwrap();
        assert_eq!(cli.ca_store, Some("/etc/ca.pem".into()));
    }

    #[test]
    fn test_settings_require_api() {
        let cli = Cli::try_parse_from(["kubectl-watchdog", "--api-token", "abc"]).unwrap();
        assert!(matches!(
            Settings::from_cli(&cli, no_env),
            Err(ConfigError::MissingApi)
        ));
    }

    #[test]
    fn test_settings_literal_token_wins() {
        let cli = Cli::try_parse_from([
            "kubectl-watchdog",
            "--api",
            "api.example:6443",
            "--api-token",
            "abc",
            "--token",
            "/nonexistent/token",
            "-n",
            "shop",
        ])
        .unwrap();
        let settings = Settings::from_cli(&cli, no_env).unwrap();
        assert_eq!(settings.api_base, "https://api.example:6443/api/v1");
        assert_eq!(settings.token, "abc");
        assert_eq!(settings.namespace.as_deref(), Some("shop"));
        assert!(settings.ca_pem.is_none());
        assert!(settings.slack.is_none());
    }

    #[test]
    fn test_settings_read_token_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  sha256~secret  ").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let cli =
            Cli::try_parse_from(["kubectl-watchdog", "--api", "api.example", "--token", path.as_str()])
                .unwrap();
        let settings = Settings::from_cli(&cli, no_env).unwrap();
        assert_eq!(settings.token, "sha256~secret");
    }

    #[test]
    fn test_settings_missing_token_file() {
        let cli = Cli::try_parse_from([
            "kubectl-watchdog",
            "--api",
            "api.example",
            "--token",
            "/nonexistent/token",
        ])
        .unwrap();
        assert!(matches!(
            Settings::from_cli(&cli, no_env),
            Err(ConfigError::Token { .. })
        ));
    }

    #[test]
    fn test_settings_read_ca_store() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"-----BEGIN CERTIFICATE-----\n").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let cli = Cli::try_parse_from([
            "kubectl-watchdog",
            "--api",
            "api.example",
            "--api-token",
            "abc",
            "--ca-store",
            path.as_str(),
        ])
        .unwrap();
        let settings = Settings::from_cli(&cli, no_env).unwrap();
        assert_eq!(
            settings.ca_pem.as_deref(),
            Some(&b"-----BEGIN CERTIFICATE-----\n"[..])
        );
    }

    #[test]
    fn test_slack_needs_token_and_channel() {
        let both = |key: &str| match key {
            "SLACK_TOKEN" => Some("xoxb-1".to_string()),
            "SLACK_CHANNEL" => Some("#ops".to_string()),
            _ => None,
        };
        let slack = config::slack_from_env(both).unwrap();
        assert_eq!(slack.token, "xoxb-1");
        assert_eq!(slack.channel, "#ops");

        let token_only = |key: &str| (key == "SLACK_TOKEN").then(|| "xoxb-1".to_string());
        assert!(config::slack_from_env(token_only).is_none());
    }

    #[test]
    fn test_get_color_is_stable() {
        assert_eq!(utils::get_color("shop"), utils::get_color("shop"));
    }

    #[test]
    fn test_palette_plain_banner() {
        let palette = Palette::plain();
        let banner = palette.banner("OOM KILLED");
        assert_eq!(banner.len(), 80);
        assert_eq!(banner, format!("{}OOM KILLED{}", "*".repeat(35), "*".repeat(35)));
        assert_eq!(palette.rule(), "*".repeat(80));
    }

    #[test]
    fn test_palette_color_wraps_text() {
        let palette = Palette::new(true);
        let styled = palette.white("web-1");
        assert!(styled.contains("web-1"));
        assert_eq!(Palette::plain().namespace("shop"), "shop");
    }

    #[tokio::test]
    async fn test_pod_oom_end_to_end() {
        let (console, buffer) = SharedBuffer::console();
        let notifier = Arc::new(RecordingNotifier::default());
        let observers = default_observers(
            at(SINCE),
            Palette::plain(),
            console,
            Some(notifier.clone() as Arc<dyn Notifier>),
        );
        let source = ScriptedSource::new([Connection::lines([oom_pod_line(
            "shop",
            "web-1",
            "app",
            "2024-03-01T10:04:00Z",
        )])]);
        let mut feed = Feed::new(source, ResourceKind::Pods, None, observers)
            .with_reconnect_delay(Duration::ZERO);

        feed.run().await;

        let out = buffer.contents();
        assert_eq!(out.matches("OOM KILLED").count(), 1);
        assert!(out.contains("Pod: web-1"));
        assert!(out.contains("Container: app"));
        assert!(out.contains("shop: [Running] web-1"));
        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("Pod: web-1"));
        assert!(messages[0].contains("Container: app"));
    }

    #[tokio::test]
    async fn test_failed_pod_kill_end_to_end() {
        let (console, buffer) = SharedBuffer::console();
        let notifier = Arc::new(RecordingNotifier::default());
        let observers = default_observers(
            at(SINCE),
            Palette::plain(),
            console,
            Some(notifier.clone() as Arc<dyn Notifier>),
        );
        let source = ScriptedSource::new([Connection::lines([
            event_line("shop", "web-1", "FailedKillPod", "timeout", "2024-03-01T10:01:00Z", "node-1"),
            event_line("shop", "web-1", "FailedKillPod", "timeout", "2024-03-01T10:02:00Z", "node-1"),
        ])]);
        let mut feed = Feed::new(source, ResourceKind::Events, None, observers)
            .with_reconnect_delay(Duration::ZERO);

        feed.run().await;

        assert_eq!(notifier.messages().len(), 1);
        let out = buffer.contents();
        assert_eq!(out.matches("Failed to kill pod").count(), 1);
        // Both event lines differ by timestamp, so both are printed
        assert_eq!(out.matches("[FailedKillPod] on Pod/web-1").count(), 2);
    }

    #[tokio::test]
    async fn test_feeds_share_observers() {
        let (console, buffer) = SharedBuffer::console();
        let observers = default_observers(at(SINCE), Palette::plain(), console, None);
        let pods = ScriptedSource::new([Connection::dropped([pod_line("shop", "web-1", "Running")])]);
        let events = ScriptedSource::new([Connection::lines([event_line(
            "default",
            "node-1",
            "SystemOOM",
            "System OOM encountered",
            "2024-03-01T10:01:00Z",
            "node-1",
        )])]);
        let mut pod_feed = Feed::new(pods.clone(), ResourceKind::Pods, None, observers.clone())
            .with_reconnect_delay(Duration::ZERO);
        let mut event_feed = Feed::new(events, ResourceKind::Events, None, observers)
            .with_reconnect_delay(Duration::ZERO);

        tokio::join!(pod_feed.run(), event_feed.run());

        assert_eq!(pods.opened(), 2);
        assert_eq!(pod_feed.state().len(), 1);
        assert_eq!(event_feed.state().len(), 1);
        let out = buffer.contents();
        assert!(out.contains("shop: [Running] web-1"));
        assert!(out.contains("[SystemOOM] on Pod/node-1"));
        assert_eq!(out.matches("SYSTEM OOM").count(), 1);
    }
}
