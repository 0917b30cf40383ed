//! Service assembly: providers, engines, handler and health probes from a [`Config`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::info;

use herald_dispatch::DispatchEngine;
use herald_health::{ComponentInfo, ProbeOrchestrator, ProbeSpec, tcp_probe};

use crate::channels::{SmsClient, SmtpClient};
use crate::config::Config;
use crate::error::Result;
use crate::handler::NotifierHandler;
use crate::providers::{ApnsClient, FcmClient};
use crate::queue::QueuePublisher;

/// Build the handler with every channel the configuration enables.
///
/// Both push engines draw from one admission semaphore, so `PUSH_MAX_CONCURRENCY`
/// bounds in-flight provider calls for the whole process.
pub fn build_handler(config: &Config) -> Result<NotifierHandler> {
    let admission = Arc::new(Semaphore::new(config.dispatch.max_concurrency.max(1)));
    let mut handler = NotifierHandler::new();

    if let Some(apns) = &config.apns {
        let engine = DispatchEngine::with_config(ApnsClient::new(apns)?, config.dispatch.clone())
            .with_admission(admission.clone());
        handler = handler.with_ios(Arc::new(engine));
    }
    if let Some(fcm) = &config.fcm {
        let engine = DispatchEngine::with_config(FcmClient::new(fcm)?, config.android_dispatch())
            .with_admission(admission.clone());
        handler = handler.with_android(Arc::new(engine));
    }
    if let Some(smtp) = &config.smtp {
        handler = handler.with_email(Arc::new(SmtpClient::new(smtp.clone())?));
    }
    if let Some(sms) = &config.sms {
        handler = handler.with_sms(Arc::new(SmsClient::new(sms.clone())?));
    }

    info!(channels = ?handler.channels(), "Notification channels configured");
    Ok(handler)
}

/// Probe reporting a saturated intake queue. Only degrades the status to partial.
pub fn queue_probe(publisher: QueuePublisher, timeout: Duration) -> ProbeSpec {
    ProbeSpec::new("queue", move |_token| {
        let available = publisher.available();
        async move {
            if available == 0 {
                anyhow::bail!("notification queue is full");
            }
            Ok(())
        }
    })
    .timeout(timeout)
    .skip_on_err(true)
}

/// Build the orchestrator behind `/health`.
pub fn build_orchestrator(config: &Config, publisher: &QueuePublisher) -> Result<ProbeOrchestrator> {
    let mut probes = vec![queue_probe(publisher.clone(), config.health.probe_timeout)];
    if let Some(addr) = &config.health.broker_addr {
        probes.push(
            tcp_probe("broker", addr.clone(), config.health.probe_timeout)
                .timeout(config.health.probe_timeout),
        );
    }

    let orchestrator = ProbeOrchestrator::builder()
        .component(ComponentInfo {
            name: config.app.name.clone(),
            version: config.app.version.clone(),
        })
        .max_concurrent(config.health.max_concurrent)
        .system_info(config.health.system_info)
        .with_probes(probes)
        .build()?;

    info!(probes = ?orchestrator.names(), "Health probes registered");
    Ok(orchestrator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue;
    use herald_health::HealthStatus;
    use std::collections::HashMap;
    use tokio_util::sync::CancellationToken;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    #[test]
    fn test_handler_without_providers() {
        let handler = build_handler(&config(&[])).unwrap();
        assert!(handler.channels().is_empty());
    }

    #[test]
    fn test_handler_with_channels() {
        crate::http_client::install_rustls_provider();
        let handler = build_handler(&config(&[
            ("SMTP_HOST", "127.0.0.1"),
            ("SMTP_FROM", "noreply@herald.test"),
            ("SMS_GATEWAY_URL", "http://127.0.0.1:1/send"),
            ("FCM_ANDROID_API_KEY", "key"),
        ]))
        .unwrap();
        assert_eq!(handler.channels(), vec!["email", "sms", "android"]);
    }

    #[tokio::test]
    async fn test_orchestrator_reports_full_queue_as_partial() {
        let (publisher, _consumer) = queue::channel(1);
        let config = config(&[("APP_NAME", "herald-test")]);
        let orchestrator = build_orchestrator(&config, &publisher).unwrap();
        assert_eq!(orchestrator.names(), vec!["queue"]);

        let snapshot = orchestrator.measure(&CancellationToken::new()).await;
        assert_eq!(snapshot.status, HealthStatus::Ok);
        assert_eq!(snapshot.component.name, "herald-test");

        publisher.publish(b"{}".to_vec()).unwrap();
        let snapshot = orchestrator.measure(&CancellationToken::new()).await;
        assert_eq!(snapshot.status, HealthStatus::PartiallyAvailable);
        assert_eq!(snapshot.failures["queue"], "notification queue is full");
    }

    #[test]
    fn test_queue_probe_uses_configured_timeout() {
        let (publisher, _consumer) = queue::channel(1);
        let config = config(&[("HEALTH_PROBE_TIMEOUT_MS", "750")]);
        let probe = queue_probe(publisher, config.health.probe_timeout);
        assert_eq!(probe.timeout, Duration::from_millis(750));
        assert!(probe.skip_on_err);
    }

    #[tokio::test]
    async fn test_orchestrator_registers_broker_probe() {
        let (publisher, _consumer) = queue::channel(4);
        let config = config(&[("HEALTH_BROKER_ADDR", "127.0.0.1:5672")]);
        let orchestrator = build_orchestrator(&config, &publisher).unwrap();
        assert_eq!(orchestrator.names(), vec!["broker", "queue"]);
    }
}
