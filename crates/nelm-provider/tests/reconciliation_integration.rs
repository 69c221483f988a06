//! Integration tests for the reconciliation pass.
//!
//! These drive `Reconciler::reconcile_all` against the recording doubles in
//! `common` and check what reached the collaborators, pass by pass:
//!
//! - a new desired device is registered and announced but not connected;
//! - repeating a pass with nothing changed makes no further store writes;
//! - discovery only ever happens on the local master;
//! - ports are discovered once and never replaced by a later pass;
//! - an available device that stops answering is marked disconnected once.

mod common;

use std::sync::Arc;

use common::{make_desired, make_driver, make_id, Call, Harness, StaticDriver, StaticStatistics};
use nelm_core::CapabilitySet;
use nelm_provider::application::collaborators::ConfigReadError;

#[tokio::test]
async fn test_new_device_is_registered_and_announced_without_discovery() {
    // Arrange: reachable, but no node masters it yet.
    let h = Harness::new(vec![make_desired("10.0.0.1", 830)]);
    let id = make_id("10.0.0.1", 830);
    h.prober.set_reachable(&id, true);
    h.store.set_capabilities(&id, make_driver(&id, 4));

    // Act
    h.reconciler.reconcile_all().await;

    // Assert: credentials, then a placeholder that is not yet available.
    assert_eq!(
        h.log.calls(),
        vec![Call::StoreKey(id.clone()), Call::DeviceConnected(id.clone(), false)]
    );
    assert_eq!(h.store.description(&id).unwrap().manufacturer, "unknown");
}

#[tokio::test]
async fn test_second_pass_with_nothing_changed_writes_nothing() {
    // Arrange
    let h = Harness::new(vec![make_desired("10.0.0.1", 830)]);
    let id = make_id("10.0.0.1", 830);
    h.prober.set_reachable(&id, true);
    h.mastership.make_local_master(&id);
    h.store.set_capabilities(&id, make_driver(&id, 4));

    h.reconciler.reconcile_all().await;
    assert_eq!(
        h.log.store_writes(),
        vec![
            Call::DeviceConnected(id.clone(), false),
            Call::DeviceConnected(id.clone(), true),
            Call::UpdatePorts(id.clone(), 4),
        ]
    );
    assert_eq!(h.store.description(&id).unwrap().manufacturer, "Acme");

    // Act
    h.log.clear();
    h.reconciler.reconcile_all().await;

    // Assert
    assert!(h.log.calls().is_empty(), "unexpected calls: {:?}", h.log.calls());
}

#[tokio::test]
async fn test_remote_master_gets_no_discovery_and_no_session() {
    let h = Harness::new(vec![make_desired("10.0.0.1", 830)]);
    let id = make_id("10.0.0.1", 830);
    h.prober.set_reachable(&id, true);
    h.mastership.make_remote_master(&id);
    h.store.set_capabilities(&id, make_driver(&id, 4));

    h.reconciler.reconcile_all().await;
    h.reconciler.reconcile_all().await;

    assert_eq!(h.log.count(|c| matches!(c, Call::OpenSession(_))), 0);
    assert_eq!(h.log.count(|c| matches!(c, Call::UpdatePorts(..))), 0);
    assert!(!h.store.available(&id));
}

#[tokio::test]
async fn test_discovered_ports_are_not_replaced_by_later_passes() {
    // Arrange
    let h = Harness::new(vec![make_desired("10.0.0.1", 830)]);
    let id = make_id("10.0.0.1", 830);
    h.prober.set_reachable(&id, true);
    h.mastership.make_local_master(&id);
    h.store.set_capabilities(&id, make_driver(&id, 4));
    h.reconciler.reconcile_all().await;

    // Act: the driver now reports fewer ports.
    h.store.set_capabilities(&id, make_driver(&id, 2));
    h.reconciler.reconcile_all().await;
    h.reconciler.reconcile_all().await;

    // Assert
    assert_eq!(h.log.count(|c| matches!(c, Call::UpdatePorts(..))), 1);
    assert_eq!(h.store.ports(&id).len(), 4);
}

#[tokio::test]
async fn test_empty_port_list_is_retried_on_the_next_pass() {
    // Arrange: the device answers with no ports at first.
    let h = Harness::new(vec![make_desired("10.0.0.1", 830)]);
    let id = make_id("10.0.0.1", 830);
    h.prober.set_reachable(&id, true);
    h.mastership.make_local_master(&id);
    h.store.set_capabilities(
        &id,
        CapabilitySet::new().with_description(Arc::new(StaticDriver {
            description: None,
            ports: Vec::new(),
        })),
    );
    h.reconciler.reconcile_all().await;
    assert_eq!(h.log.count(|c| matches!(c, Call::UpdatePorts(..))), 0);

    // Act
    h.store.set_capabilities(&id, make_driver(&id, 3));
    h.reconciler.reconcile_all().await;

    // Assert
    assert_eq!(h.log.count(|c| matches!(c, Call::UpdatePorts(_, 3))), 1);
}

#[tokio::test]
async fn test_port_statistics_wait_until_ports_are_known() {
    // Arrange: statistics are supported but the port list is still empty.
    let h = Harness::new(vec![make_desired("10.0.0.1", 830)]);
    let id = make_id("10.0.0.1", 830);
    h.prober.set_reachable(&id, true);
    h.mastership.make_local_master(&id);
    h.store.set_capabilities(
        &id,
        CapabilitySet::new()
            .with_description(Arc::new(StaticDriver {
                description: None,
                ports: Vec::new(),
            }))
            .with_port_statistics(Arc::new(StaticStatistics { ports: 2 })),
    );

    // Act
    for _ in 0..3 {
        h.reconciler.reconcile_all().await;
    }

    // Assert
    assert_eq!(h.log.count(|c| matches!(c, Call::UpdatePortStatistics(_))), 0);

    // Once ports show up, statistics follow them exactly once.
    h.store.set_capabilities(
        &id,
        make_driver(&id, 2).with_port_statistics(Arc::new(StaticStatistics { ports: 2 })),
    );
    h.reconciler.reconcile_all().await;
    h.reconciler.reconcile_all().await;
    assert_eq!(h.log.count(|c| matches!(c, Call::UpdatePorts(_, 2))), 1);
    assert_eq!(h.log.count(|c| matches!(c, Call::UpdatePortStatistics(_))), 1);
}

#[tokio::test]
async fn test_unreachable_available_device_is_disconnected_once() {
    // Arrange
    let h = Harness::new(vec![make_desired("10.0.0.1", 830)]);
    let id = make_id("10.0.0.1", 830);
    h.prober.set_reachable(&id, true);
    h.mastership.make_local_master(&id);
    h.reconciler.reconcile_all().await;
    assert!(h.store.available(&id));

    // Act
    h.prober.set_reachable(&id, false);
    h.reconciler.reconcile_all().await;
    h.reconciler.reconcile_all().await;

    // Assert
    assert_eq!(
        h.log.count(|c| matches!(c, Call::DeviceDisconnected(_))),
        1
    );
    assert!(!h.store.available(&id));
    assert!(!h.records.ports_discovered(&id));
}

#[tokio::test]
async fn test_device_without_capabilities_stays_available_without_ports() {
    // Arrange
    let h = Harness::new(vec![make_desired("10.0.0.1", 830)]);
    let id = make_id("10.0.0.1", 830);
    h.prober.set_reachable(&id, true);
    h.mastership.make_local_master(&id);

    // Act
    h.reconciler.reconcile_all().await;
    h.reconciler.reconcile_all().await;

    // Assert: announced with the default description, never any ports.
    assert_eq!(h.log.count(|c| matches!(c, Call::UpdatePorts(..))), 0);
    assert_eq!(h.log.count(|c| matches!(c, Call::DeviceConnected(_, true))), 1);
    assert!(h.store.available(&id));
    assert_eq!(h.store.description(&id).unwrap().manufacturer, "unknown");
}

#[tokio::test]
async fn test_unreadable_configuration_skips_the_pass() {
    let h = Harness::new(vec![make_desired("10.0.0.1", 830)]);
    h.config
        .fail(ConfigReadError::Unavailable(common::APP_ID.to_string()));

    h.reconciler.reconcile_all().await;

    assert!(h.log.calls().is_empty());
    assert!(h.records.is_empty());
}

#[tokio::test]
async fn test_invalid_entry_does_not_stop_the_others() {
    let h = Harness::new(vec![
        make_desired("not-an-address", 830),
        make_desired("10.0.0.2", 830),
    ]);
    let id = make_id("10.0.0.2", 830);

    h.reconciler.reconcile_all().await;

    assert_eq!(
        h.log.calls(),
        vec![Call::StoreKey(id.clone()), Call::DeviceConnected(id, false)]
    );
}

#[tokio::test]
async fn test_device_dropped_from_configuration_loses_its_record() {
    // Arrange
    let h = Harness::new(vec![make_desired("10.0.0.1", 830)]);
    let id = make_id("10.0.0.1", 830);
    h.reconciler.reconcile_all().await;
    assert!(h.records.contains(&id));

    // Act
    h.config.set(Vec::new());
    h.reconciler.reconcile_all().await;

    // Assert
    assert!(!h.records.contains(&id));
}

#[tokio::test]
async fn test_changed_credentials_are_stored_again() {
    let h = Harness::new(vec![make_desired("10.0.0.1", 830)]);
    let id = make_id("10.0.0.1", 830);
    h.reconciler.reconcile_all().await;

    let mut changed = make_desired("10.0.0.1", 830);
    changed.password = "rotated".to_string();
    h.config.set(vec![changed]);
    h.reconciler.reconcile_all().await;

    assert_eq!(h.log.count(|c| *c == Call::StoreKey(id.clone())), 2);
}
