// Copyright 2024 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! The per-zone refresh driver for secondary and stub zones.
//!
//! Each refreshed zone owns one timer thread. The thread sleeps until
//! the zone's SOA timers make it due, runs the expiry check, and (if
//! no refresh is already in flight) performs the transfer through the
//! catalog's [`XfrClient`]. Deleting the zone stops the thread and
//! cancels any transfer in progress.

use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use log::{debug, info, warn};

use crate::name::Name;
use crate::rr::{NsInfo, Record, RecordInfo, Rrset, Type};
use crate::tree::ApexMatch;
use crate::xfr::{self, CancelToken, XfrClient};
use crate::zone::ZoneKind;

use super::Inner;

/// The retry interval used before a zone has an SOA to take timers
/// from (i.e. before its first successful refresh).
const BOOTSTRAP_RETRY: Duration = Duration::from_secs(60);

/// The longest single sleep between timer re-evaluations.
const MAX_WAIT: Duration = Duration::from_secs(3600);

/// The control block of one zone's refresh thread.
pub(super) struct RefreshHandle {
    shutdown: Arc<(Mutex<bool>, Condvar)>,
    cancel: CancelToken,
    thread: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Signals the thread to exit, cancels any transfer in flight, and
    /// waits for the thread to finish.
    pub fn stop(&mut self) {
        {
            let (flag, wakeup) = &*self.shutdown;
            *flag.lock().unwrap() = true;
            wakeup.notify_all();
        }
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts the refresh thread for a secondary or stub zone.
pub(super) fn spawn(inner: Weak<Inner>, zone_name: Box<Name>) -> RefreshHandle {
    let shutdown = Arc::new((Mutex::new(false), Condvar::new()));
    let cancel = CancelToken::new();
    let thread_shutdown = shutdown.clone();
    let thread_cancel = cancel.clone();
    let thread = thread::Builder::new()
        .name(format!("refresh {}", zone_name))
        .spawn(move || run(inner, zone_name, thread_shutdown, thread_cancel))
        .ok();
    if thread.is_none() {
        warn!("failed to start a refresh thread; the zone will not refresh");
    }
    RefreshHandle {
        shutdown,
        cancel,
        thread,
    }
}

fn run(
    inner: Weak<Inner>,
    zone_name: Box<Name>,
    shutdown: Arc<(Mutex<bool>, Condvar)>,
    cancel: CancelToken,
) {
    loop {
        // Work out how long to sleep, then release every strong
        // reference before sleeping.
        let sleep = {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let Some(apex) = inner.apex_match(&zone_name) else {
                return;
            };
            let Some(tracker) = apex.zone.refresh() else {
                return;
            };

            let soa = apex.node.soa_fields();
            let (refresh, retry, expire) = match &soa {
                Some(soa) => (
                    Duration::from_secs(soa.refresh as u64),
                    Duration::from_secs(soa.retry as u64),
                    Duration::from_secs(soa.expire as u64),
                ),
                None => (BOOTSTRAP_RETRY, BOOTSTRAP_RETRY, Duration::MAX),
            };
            if expire != Duration::MAX {
                tracker.check_expiry(expire, SystemTime::now());
            }

            let due = tracker.next_due(refresh, retry);
            due.duration_since(SystemTime::now())
                .unwrap_or(Duration::ZERO)
        };

        // The wait is clamped to an hour so that SOA timer changes are
        // picked up; a clamped wait just loops back to re-plan.
        let clamped = sleep > MAX_WAIT;
        if wait_for_shutdown(&shutdown, sleep.min(MAX_WAIT)) {
            return;
        }
        if clamped {
            continue;
        }

        let Some(inner) = inner.upgrade() else {
            return;
        };
        let Some(apex) = inner.apex_match(&zone_name) else {
            return;
        };
        let Some(tracker) = apex.zone.refresh() else {
            return;
        };
        if !tracker.begin() {
            continue;
        }
        match refresh_once(&inner, &apex, &cancel) {
            Ok(()) => {
                tracker.complete();
                inner.schedule_save(apex.zone.name());
            }
            Err(message) => {
                warn!("refresh of {} failed: {}", apex.zone.name(), message);
                tracker.fail();
            }
        }
    }
}

/// Sleeps up to `duration`, returning `true` if shutdown was signalled.
fn wait_for_shutdown(shutdown: &Arc<(Mutex<bool>, Condvar)>, duration: Duration) -> bool {
    let (flag, wakeup) = &**shutdown;
    let deadline = Instant::now() + duration;
    let mut stopped = flag.lock().unwrap();
    while !*stopped {
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        let (next, _) = wakeup.wait_timeout(stopped, deadline - now).unwrap();
        stopped = next;
    }
    true
}

/// Performs one refresh attempt.
fn refresh_once(inner: &Inner, apex: &ApexMatch, cancel: &CancelToken) -> Result<(), String> {
    let client = inner
        .xfr_client
        .as_ref()
        .ok_or("no transfer client configured")?;
    let primaries = apex.zone.primaries();
    if primaries.is_empty() {
        return Err("no primary servers configured".to_owned());
    }

    match apex.zone.kind() {
        ZoneKind::Secondary => {
            refresh_secondary(inner, apex, client.as_ref(), &primaries, cancel)
        }
        ZoneKind::Stub => refresh_stub(apex, client.as_ref(), &primaries, cancel),
        _ => Err("zone kind does not refresh".to_owned()),
    }
}

fn refresh_secondary(
    inner: &Inner,
    apex: &ApexMatch,
    client: &dyn XfrClient,
    primaries: &[std::net::SocketAddr],
    cancel: &CancelToken,
) -> Result<(), String> {
    let zone_name = apex.zone.name();
    let records = match apex.node.soa_serial() {
        Some(current) => {
            let remote = client
                .query_soa_serial(zone_name, primaries, cancel)
                .map_err(|err| err.to_string())?;
            if !remote.succeeds(current) {
                debug!("{} is current at serial {}", zone_name, current);
                return Ok(());
            }
            client
                .request_ixfr(zone_name, current, primaries, cancel)
                .map_err(|err| err.to_string())?
        }
        None => client
            .request_axfr(zone_name, primaries, cancel)
            .map_err(|err| err.to_string())?,
    };

    // An IXFR-capable server may still answer with a full transfer; a
    // full transfer's body starts with ordinary records, while an
    // incremental body starts with another SOA (RFC 1995 § 4).
    let incremental = records.len() > 1 && records[1].rr_type == Type::SOA;
    let outcome = if incremental {
        xfr::apply_ixfr(&inner.tree, apex, &records)
    } else {
        xfr::apply_axfr(&inner.tree, apex, &records)
    };
    outcome.map_err(|err| err.to_string())?;
    info!(
        "{} refreshed to serial {}",
        zone_name,
        apex.node
            .soa_serial()
            .map(|serial| serial.to_string())
            .unwrap_or_else(|| "?".to_owned()),
    );
    Ok(())
}

fn refresh_stub(
    apex: &ApexMatch,
    client: &dyn XfrClient,
    primaries: &[std::net::SocketAddr],
    cancel: &CancelToken,
) -> Result<(), String> {
    let records = client
        .fetch_stub(apex.zone.name(), primaries, cancel)
        .map_err(|err| err.to_string())?;
    install_stub_records(apex, &records);
    Ok(())
}

/// Replaces a stub zone's content with freshly fetched NS records,
/// attaching the accompanying addresses as glue.
fn install_stub_records(apex: &ApexMatch, records: &[Record]) {
    let mut ns_rrset: Option<Rrset> = None;
    for record in records {
        if record.rr_type != Type::NS {
            continue;
        }
        let glue: Vec<Record> = crate::rr::helpers::read_name(&record.rdata, 0)
            .map(|target| {
                records
                    .iter()
                    .filter(|candidate| {
                        candidate.rr_type.is_address()
                            && candidate.owner.as_ref() == target.as_ref()
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let rrset = ns_rrset.get_or_insert_with(|| Rrset::new(Type::NS, record.ttl));
        let info = RecordInfo::Ns(NsInfo {
            glue,
            ..NsInfo::default()
        });
        let _ = rrset.insert(rrset.ttl(), record.rdata.clone(), info);
    }

    if let Some(rrset) = ns_rrset {
        apex.node.put_rrset(rrset);
        apex.zone.touch();
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::catalog::{Catalog, CatalogConfig};
    use crate::class::Class;
    use crate::rr::helpers::SoaFields;
    use crate::rr::{RdataBuf, Serial, Ttl};
    use crate::xfr::{ClientError, XfrClient};

    const APEX: &str = "mirror.test.";

    fn boxed_name(from: &str) -> Box<Name> {
        from.parse().unwrap()
    }

    fn primaries() -> Vec<SocketAddr> {
        vec!["192.0.2.1:53".parse().unwrap()]
    }

    fn soa_record(serial: u32) -> Record {
        let fields = SoaFields {
            mname: "ns1.mirror.test.".parse().unwrap(),
            rname: "hostmaster.mirror.test.".parse().unwrap(),
            serial: Serial::from(serial),
            refresh: 900,
            retry: 300,
            expire: 604800,
            minimum: 3600,
        };
        Record::new(
            boxed_name(APEX),
            Type::SOA,
            Class::IN,
            Ttl::from(3600),
            fields.to_rdata(),
        )
    }

    fn a_record(owner: &str, octets: [u8; 4]) -> Record {
        Record::new(
            boxed_name(owner),
            Type::A,
            Class::IN,
            Ttl::from(3600),
            RdataBuf::try_from(&octets[..]).unwrap(),
        )
    }

    fn ns_record(owner: &str, target: &str) -> Record {
        Record::new(
            boxed_name(owner),
            Type::NS,
            Class::IN,
            Ttl::from(3600),
            RdataBuf::try_from(boxed_name(target).wire_repr()).unwrap(),
        )
    }

    fn put_record(catalog: &Catalog, record: &Record) {
        let node = catalog.inner.tree.get_or_add(&record.owner);
        let mut rrset = match node.rrset(record.rr_type) {
            Some(existing) => (*existing).clone(),
            None => Rrset::new(record.rr_type, record.ttl),
        };
        rrset
            .insert(record.ttl, record.rdata.clone(), record.info.clone())
            .unwrap();
        node.put_rrset(rrset);
    }

    /// Builds a catalog hosting one secondary zone. No transfer client
    /// is configured, so no background refresh thread competes with
    /// the test; the fake client is passed to the refresh functions
    /// directly.
    fn secondary_catalog() -> (Catalog, ApexMatch) {
        let catalog = Catalog::new(CatalogConfig::new(boxed_name("ns1.server.test.")));
        catalog.create_secondary_zone(APEX, primaries()).unwrap();
        let apex = catalog.inner.apex_match(&boxed_name(APEX)).unwrap();
        (catalog, apex)
    }

    /// A scripted stand-in for an outbound transfer client: it reports
    /// a fixed remote serial and answers every transfer request with
    /// one canned record stream, remembering which requests were made.
    struct FakeClient {
        remote_serial: Serial,
        response: Vec<Record>,
        axfr_requested: AtomicBool,
        ixfr_requested: AtomicBool,
    }

    impl FakeClient {
        fn new(remote_serial: u32, response: Vec<Record>) -> Self {
            Self {
                remote_serial: Serial::from(remote_serial),
                response,
                axfr_requested: AtomicBool::new(false),
                ixfr_requested: AtomicBool::new(false),
            }
        }
    }

    impl XfrClient for FakeClient {
        fn query_soa_serial(
            &self,
            _zone: &Name,
            _primaries: &[SocketAddr],
            _cancel: &CancelToken,
        ) -> Result<Serial, ClientError> {
            Ok(self.remote_serial)
        }

        fn request_axfr(
            &self,
            _zone: &Name,
            _primaries: &[SocketAddr],
            _cancel: &CancelToken,
        ) -> Result<Vec<Record>, ClientError> {
            self.axfr_requested.store(true, Ordering::SeqCst);
            Ok(self.response.clone())
        }

        fn request_ixfr(
            &self,
            _zone: &Name,
            _serial: Serial,
            _primaries: &[SocketAddr],
            _cancel: &CancelToken,
        ) -> Result<Vec<Record>, ClientError> {
            self.ixfr_requested.store(true, Ordering::SeqCst);
            Ok(self.response.clone())
        }

        fn fetch_stub(
            &self,
            _zone: &Name,
            _primaries: &[SocketAddr],
            _cancel: &CancelToken,
        ) -> Result<Vec<Record>, ClientError> {
            Ok(self.response.clone())
        }
    }

    #[test]
    fn secondary_refresh_applies_incremental_bodies() {
        let (catalog, apex) = secondary_catalog();
        put_record(&catalog, &soa_record(1));
        put_record(&catalog, &a_record("www.mirror.test.", [192, 0, 2, 1]));

        // An incremental body: the record after the framing SOA is
        // another SOA.
        let diff = vec![
            soa_record(3),
            soa_record(1),
            a_record("www.mirror.test.", [192, 0, 2, 1]),
            soa_record(3),
            a_record("www.mirror.test.", [192, 0, 2, 2]),
            soa_record(3),
        ];
        let client = FakeClient::new(3, diff);
        refresh_secondary(&catalog.inner, &apex, &client, &primaries(), &CancelToken::new())
            .unwrap();

        assert!(client.ixfr_requested.load(Ordering::SeqCst));
        assert!(!client.axfr_requested.load(Ordering::SeqCst));
        assert_eq!(apex.node.soa_serial(), Some(Serial::from(3)));
        let www = catalog
            .inner
            .tree
            .get(&boxed_name("www.mirror.test."))
            .unwrap();
        let rrset = www.rrset(Type::A).unwrap();
        let (rdata, _) = rrset.first().unwrap();
        assert_eq!(rdata.octets(), &[192, 0, 2, 2]);
        // Incremental application journals the upstream's sequence.
        assert!(!apex.zone.journal().unwrap().lock().unwrap().is_empty());
    }

    #[test]
    fn secondary_refresh_detects_full_transfer_bodies() {
        let (catalog, apex) = secondary_catalog();
        put_record(&catalog, &soa_record(1));
        put_record(&catalog, &a_record("www.mirror.test.", [192, 0, 2, 1]));

        // An IXFR request may still be answered with a full transfer:
        // the record after the framing SOA is ordinary data.
        let full = vec![
            soa_record(3),
            a_record("mail.mirror.test.", [192, 0, 2, 3]),
            soa_record(3),
        ];
        let client = FakeClient::new(3, full);
        refresh_secondary(&catalog.inner, &apex, &client, &primaries(), &CancelToken::new())
            .unwrap();

        assert!(client.ixfr_requested.load(Ordering::SeqCst));
        assert_eq!(apex.node.soa_serial(), Some(Serial::from(3)));
        // The content was replaced wholesale, not patched.
        assert!(catalog
            .inner
            .tree
            .get(&boxed_name("www.mirror.test."))
            .is_none());
        assert!(catalog
            .inner
            .tree
            .get(&boxed_name("mail.mirror.test."))
            .is_some());
        assert!(apex.zone.journal().unwrap().lock().unwrap().is_empty());
    }

    #[test]
    fn first_refresh_requests_a_full_transfer() {
        let (catalog, apex) = secondary_catalog();

        let full = vec![
            soa_record(7),
            a_record("www.mirror.test.", [192, 0, 2, 1]),
            soa_record(7),
        ];
        let client = FakeClient::new(7, full);
        refresh_secondary(&catalog.inner, &apex, &client, &primaries(), &CancelToken::new())
            .unwrap();

        assert!(client.axfr_requested.load(Ordering::SeqCst));
        assert!(!client.ixfr_requested.load(Ordering::SeqCst));
        assert_eq!(apex.node.soa_serial(), Some(Serial::from(7)));
    }

    #[test]
    fn up_to_date_secondaries_skip_the_transfer() {
        let (catalog, apex) = secondary_catalog();
        put_record(&catalog, &soa_record(5));

        let client = FakeClient::new(5, Vec::new());
        refresh_secondary(&catalog.inner, &apex, &client, &primaries(), &CancelToken::new())
            .unwrap();

        assert!(!client.axfr_requested.load(Ordering::SeqCst));
        assert!(!client.ixfr_requested.load(Ordering::SeqCst));
        assert_eq!(apex.node.soa_serial(), Some(Serial::from(5)));
    }

    #[test]
    fn stub_refresh_attaches_fetched_glue() {
        let catalog = Catalog::new(CatalogConfig::new(boxed_name("ns1.server.test.")));
        catalog.create_stub_zone("partner.test.", primaries()).unwrap();
        let apex = catalog
            .inner
            .apex_match(&boxed_name("partner.test."))
            .unwrap();

        let fetched = vec![
            ns_record("partner.test.", "ns1.partner.test."),
            ns_record("partner.test.", "ns2.elsewhere.net."),
            a_record("ns1.partner.test.", [198, 51, 100, 1]),
        ];
        let client = FakeClient::new(1, fetched);
        refresh_stub(&apex, &client, &primaries(), &CancelToken::new()).unwrap();

        let ns_rrset = apex.node.rrset(Type::NS).unwrap();
        assert_eq!(ns_rrset.len(), 2);
        // The in-bailiwick name server got its address attached as
        // glue; the out-of-zone one has none, and the address never
        // became a queryable node.
        let glue_counts: Vec<usize> = ns_rrset
            .iter()
            .map(|(_, info)| info.glue().len())
            .collect();
        assert_eq!(glue_counts.iter().sum::<usize>(), 1);
        assert!(catalog
            .inner
            .tree
            .get(&boxed_name("ns1.partner.test."))
            .is_none());
    }
}
