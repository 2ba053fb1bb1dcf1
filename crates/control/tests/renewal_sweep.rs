//! End-to-end renewal sweep against reference agents over TCP.

use async_trait::async_trait;
use certfleet_agent_protocol::{
    commands, AgentHandler, AgentRequest, AgentResponse, AgentServer, CertificateIssueRequest,
};
use certfleet_common::HostGuid;
use certfleet_control::certificates::VALIDITY_FORMAT;
use certfleet_control::domains::AgentDomainProvider;
use certfleet_control::renewal::{RenewalLogWriter, RenewalManager};
use certfleet_control::settings::RENEWAL_SETTING;
use certfleet_control::{
    AgentOptions, ControlError, DomainSetting, Host, MemoryDomainSettingStore, MemoryHostStore,
    StoreError,
};
use chrono::{TimeDelta, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Agent serving fixed vhosts; issuing fails for `fail.*` server names
struct FleetAgent {
    vhosts: Value,
    issued: Mutex<Vec<CertificateIssueRequest>>,
}

impl FleetAgent {
    fn new(vhosts: Value) -> Arc<Self> {
        Arc::new(Self {
            vhosts,
            issued: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl AgentHandler for FleetAgent {
    async fn handle(&self, request: AgentRequest) -> AgentResponse {
        match request.command.as_str() {
            commands::GET_VHOSTS => AgentResponse::ok(self.vhosts.clone()),
            commands::CERTIFICATE_ISSUE => {
                let issue: CertificateIssueRequest = match serde_json::from_value(request.data) {
                    Ok(issue) => issue,
                    Err(e) => return AgentResponse::error(e.to_string()),
                };
                let failing = issue.server_name.starts_with("fail.");
                let cn = issue.server_name.clone();
                self.issued.lock().push(issue);

                if failing {
                    AgentResponse::error("acme: too many certificates already issued")
                } else {
                    AgentResponse::ok(json!({"CN": cn}))
                }
            }
            other => AgentResponse::error(format!("unknown command: {other}")),
        }
    }
}

#[derive(Default)]
struct RecordingWriter {
    calls: Mutex<Vec<(u64, Vec<String>, BTreeMap<String, String>)>>,
}

#[async_trait]
impl RenewalLogWriter for RecordingWriter {
    async fn write_log(
        &self,
        host_id: u64,
        success_domains: &[String],
        failed_domains: &BTreeMap<String, ControlError>,
    ) -> Result<(), StoreError> {
        self.calls.lock().push((
            host_id,
            success_domains.to_vec(),
            failed_domains
                .iter()
                .map(|(d, e)| (d.clone(), e.to_string()))
                .collect(),
        ));
        Ok(())
    }
}

fn host(id: u64, guid: &str, port: u16) -> Host {
    Host {
        id,
        guid: HostGuid::from(guid),
        name: guid.to_string(),
        ipv4_address: Some("127.0.0.1".to_string()),
        ipv6_address: None,
        agent_port: port,
        token: "token".to_string(),
        is_active: true,
        os_code: String::new(),
        os_version: String::new(),
        agent_version: String::new(),
    }
}

fn expiring_vhost(name: &str) -> Value {
    let valid_to = (Utc::now() + TimeDelta::days(5)).format(VALIDITY_FORMAT).to_string();
    json!({
        "ServerName": name,
        "WebServer": "nginx",
        "Addresses": [{"IsIpv6": false, "Host": "*", "Port": "443"}],
        "Certificate": {
            "CN": name,
            "ValidTo": valid_to,
            "DNSNames": [name, format!("www.{name}")],
            "EmailAddresses": ["ops@example.com"],
            "Issuer": {"CN": "R3", "Organization": ["Let's Encrypt"]}
        }
    })
}

async fn serve(agent: Arc<FleetAgent>) -> u16 {
    let server = AgentServer::bind("fleet", "127.0.0.1:0", agent).await.unwrap();
    let port = server.local_addr().unwrap().port();
    server.spawn();
    port
}

async fn unused_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_three_host_sweep() {
    let agent_a = FleetAgent::new(json!([
        expiring_vhost("ok.example.com"),
        expiring_vhost("fail.example.com"),
    ]));
    let agent_c = FleetAgent::new(json!([
        {"ServerName": "plain.example.org", "WebServer": "apache", "Certificate": null}
    ]));

    let port_a = serve(agent_a.clone()).await;
    let port_b = unused_port().await;
    let port_c = serve(agent_c.clone()).await;

    let hosts = Arc::new(MemoryHostStore::with_hosts([
        host(1, "host-a", port_a),
        host(2, "host-b", port_b),
        host(3, "host-c", port_c),
    ]));

    let guid_a = HostGuid::from("host-a");
    let settings = Arc::new(MemoryDomainSettingStore::with_settings([
        DomainSetting::new("ok.example.com", guid_a.clone(), RENEWAL_SETTING, "true"),
        DomainSetting::new("fail.example.com", guid_a.clone(), RENEWAL_SETTING, "true"),
        DomainSetting::new("plain.example.org", HostGuid::from("host-c"), RENEWAL_SETTING, "true"),
    ]));

    let options = AgentOptions::default();
    let writer = Arc::new(RecordingWriter::default());
    let manager = RenewalManager::new(
        hosts.clone(),
        settings,
        Arc::new(AgentDomainProvider::new(hosts.clone(), options)),
        writer.clone(),
    )
    .with_agent_options(options);

    let summary = manager.run().await.unwrap();

    assert_eq!(summary.hosts, 3);
    assert_eq!(summary.host_errors, 1);
    assert_eq!(summary.renewed, 1);
    assert_eq!(summary.failed, 1);

    let mut calls = writer.calls.lock().clone();
    calls.sort_by_key(|c| c.0);
    assert_eq!(calls.len(), 2);

    let (id_a, success_a, failed_a) = &calls[0];
    assert_eq!(*id_a, 1);
    assert_eq!(success_a, &vec!["ok.example.com".to_string()]);
    assert_eq!(
        failed_a.get("fail.example.com").map(String::as_str),
        Some("acme: too many certificates already issued")
    );

    let (id_c, success_c, failed_c) = &calls[1];
    assert_eq!(*id_c, 3);
    assert!(success_c.is_empty());
    assert!(failed_c.is_empty());

    assert!(calls.iter().all(|c| c.0 != 2));

    assert!(hosts.get(&guid_a).unwrap().is_active);
    assert!(!hosts.get(&HostGuid::from("host-b")).unwrap().is_active);
    assert!(hosts.get(&HostGuid::from("host-c")).unwrap().is_active);

    let issued = agent_a.issued.lock().clone();
    assert_eq!(issued.len(), 2);
    let ok = issued
        .iter()
        .find(|r| r.server_name == "ok.example.com")
        .unwrap();
    assert_eq!(ok.email, "ops@example.com");
    assert_eq!(ok.web_server, "nginx");
    assert_eq!(ok.challenge_type, "http");
    assert_eq!(
        ok.subjects,
        vec!["ok.example.com".to_string(), "www.ok.example.com".to_string()]
    );
    assert!(ok.assign);

    assert!(agent_c.issued.lock().is_empty());
}

#[tokio::test]
async fn test_renewal_disabled_domain_not_issued() {
    let agent = FleetAgent::new(json!([expiring_vhost("quiet.example.com")]));
    let port = serve(agent.clone()).await;

    let hosts = Arc::new(MemoryHostStore::with_hosts([host(1, "host-a", port)]));
    let settings = Arc::new(MemoryDomainSettingStore::with_settings([DomainSetting::new(
        "quiet.example.com",
        HostGuid::from("host-a"),
        RENEWAL_SETTING,
        "false",
    )]));

    let writer = Arc::new(RecordingWriter::default());
    let manager = RenewalManager::new(
        hosts.clone(),
        settings,
        Arc::new(AgentDomainProvider::new(hosts, AgentOptions::default())),
        writer.clone(),
    );

    let summary = manager.run().await.unwrap();
    assert_eq!(summary.renewed, 0);
    assert!(agent.issued.lock().is_empty());
    assert_eq!(writer.calls.lock().len(), 1);
}
