use crate::abi::Address;

pub const SECONDS_PER_DAY: i64 = 86_400;
/// A plant is healthy while its last care proof is at most this many days old.
pub const HEALTHY_WITHIN_DAYS: i64 = 30;

const DEFAULT_GATEWAY: &str = "gateway.pinata.cloud";

/// On-chain plant state as returned by `getPlant(id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlantRecord {
    pub id: u64,
    pub species: String,
    pub name: String,
    pub current_steward: Address,
    /// Unix seconds of the last care proof, `0` when none was submitted.
    pub last_proof_time: u64,
    /// Content identifier of the latest photo, empty when there is none.
    pub latest_photo_ipfs: String,
    pub is_memorialized: bool,
    pub stewards: Vec<Address>,
    pub is_up_for_adoption: bool,
    pub location: String,
}

/// The six-field shape of the public `plants(id)` getter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyPlant {
    pub id: u64,
    pub species: String,
    pub name: String,
    pub current_steward: Address,
    pub last_proof_time: u64,
    pub latest_photo_ipfs: String,
    pub is_memorialized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedStatus {
    /// Whole days since the last proof, `None` when no proof exists.
    /// Negative when the proof timestamp is ahead of the local clock.
    pub days_since_proof: Option<i64>,
    pub is_healthy: bool,
    pub is_owner: bool,
}

/// Pure status computation. `now` is Unix seconds.
pub fn derive_status(record: &PlantRecord, now: u64, viewer: Option<&Address>) -> DerivedStatus {
    let days_since_proof = match record.last_proof_time {
        0 => None,
        t => {
            // Any u64 difference in days fits comfortably in an i64.
            let elapsed = i128::from(now) - i128::from(t);
            Some(elapsed.div_euclid(i128::from(SECONDS_PER_DAY)) as i64)
        }
    };
    DerivedStatus {
        days_since_proof,
        is_healthy: days_since_proof.is_some_and(|d| d <= HEALTHY_WITHIN_DAYS),
        is_owner: viewer.is_some_and(|v| v.as_str() == record.current_steward.as_str()),
    }
}

impl DerivedStatus {
    pub fn care_label(&self) -> String {
        match self.days_since_proof {
            None => "Never".to_string(),
            Some(d) if d < 0 => "Just now".to_string(),
            Some(d) => format!("{d} days ago"),
        }
    }
}

/// A record paired with the status derived for one viewer at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlantView {
    pub record: PlantRecord,
    pub status: DerivedStatus,
}

impl PlantView {
    pub fn new(record: PlantRecord, now: u64, viewer: Option<&Address>) -> Self {
        let status = derive_status(&record, now, viewer);
        Self { record, status }
    }

    pub fn health_label(&self) -> &'static str {
        if self.record.is_memorialized {
            "Memorial"
        } else if self.status.is_healthy {
            "Healthy"
        } else {
            "Needs Care"
        }
    }

    /// Care actions are offered only to the current steward of a living plant.
    pub fn can_act(&self) -> bool {
        self.status.is_owner && !self.record.is_memorialized
    }
}

pub fn views(records: Vec<PlantRecord>, now: u64, viewer: Option<&Address>) -> Vec<PlantView> {
    records
        .into_iter()
        .map(|r| PlantView::new(r, now, viewer))
        .collect()
}

/// Returns the matching views in their original order; the source is untouched.
pub fn filter<P>(list: &[PlantView], predicate: P) -> Vec<PlantView>
where
    P: Fn(&PlantView) -> bool,
{
    list.iter().filter(|v| predicate(v)).cloned().collect()
}

pub fn is_adoptable(view: &PlantView) -> bool {
    view.record.is_up_for_adoption
}

/// Fetchable URL for a content identifier, `None` for the empty CID.
pub fn photo_url(gateway: Option<&str>, cid: &str) -> Option<String> {
    if cid.is_empty() {
        return None;
    }
    let host = gateway.filter(|g| !g.is_empty()).unwrap_or(DEFAULT_GATEWAY);
    Some(format!("https://{host}/ipfs/{cid}"))
}

pub fn now_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    pub(crate) fn plant(id: u64) -> PlantRecord {
        PlantRecord {
            id,
            species: "Monstera deliciosa".into(),
            name: format!("plant-{id}"),
            current_steward: addr(1),
            last_proof_time: 0,
            latest_photo_ipfs: String::new(),
            is_memorialized: false,
            stewards: vec![addr(1)],
            is_up_for_adoption: false,
            location: String::new(),
        }
    }

    const NOW: u64 = 1_700_000_000;

    #[test]
    fn test_health_boundary() {
        let mut record = plant(1);
        record.last_proof_time = NOW - 30 * 86_400;
        assert!(derive_status(&record, NOW, None).is_healthy);

        // 30 days and 23 hours still floors to 30
        record.last_proof_time = NOW - 31 * 86_400 + 3_600;
        let status = derive_status(&record, NOW, None);
        assert_eq!(status.days_since_proof, Some(30));
        assert!(status.is_healthy);

        record.last_proof_time = NOW - 31 * 86_400;
        assert!(!derive_status(&record, NOW, None).is_healthy);
    }

    #[test]
    fn test_no_proof_is_unhealthy_and_never() {
        let status = derive_status(&plant(1), NOW, None);
        assert_eq!(status.days_since_proof, None);
        assert!(!status.is_healthy);
        assert_eq!(status.care_label(), "Never");
    }

    #[test]
    fn test_future_proof_reads_just_now() {
        let mut record = plant(1);
        record.last_proof_time = NOW + 10;
        let status = derive_status(&record, NOW, None);
        assert_eq!(status.days_since_proof, Some(-1));
        assert!(status.is_healthy);
        assert_eq!(status.care_label(), "Just now");

        record.last_proof_time = NOW - 3 * 86_400;
        assert_eq!(derive_status(&record, NOW, None).care_label(), "3 days ago");
    }

    #[test]
    fn test_timestamps_beyond_i64_do_not_overflow() {
        let mut record = plant(1);
        record.last_proof_time = 1 << 63;
        let status = derive_status(&record, NOW, None);
        assert_eq!(
            status.days_since_proof,
            Some((i128::from(NOW) - (1i128 << 63)).div_euclid(86_400) as i64)
        );
        assert!(status.is_healthy);
        assert_eq!(status.care_label(), "Just now");

        record.last_proof_time = u64::MAX;
        assert_eq!(derive_status(&record, u64::MAX, None).days_since_proof, Some(0));
        record.last_proof_time = 1;
        assert_eq!(
            derive_status(&record, u64::MAX, None).days_since_proof,
            Some(((u64::MAX - 1) / 86_400) as i64)
        );
    }

    #[test]
    fn test_is_owner_exact_match() {
        let record = plant(1);
        assert!(derive_status(&record, NOW, Some(&addr(1))).is_owner);
        assert!(!derive_status(&record, NOW, Some(&addr(2))).is_owner);
        assert!(!derive_status(&record, NOW, None).is_owner);
    }

    #[test]
    fn test_derive_is_deterministic() {
        let mut record = plant(4);
        record.last_proof_time = NOW - 12 * 86_400;
        let before = record.clone();
        let a = derive_status(&record, NOW, Some(&addr(1)));
        let b = derive_status(&record, NOW, Some(&addr(1)));
        assert_eq!(a, b);
        assert_eq!(record, before);
    }

    #[test]
    fn test_filter_adoptable() {
        let mut listed = plant(2);
        listed.is_up_for_adoption = true;
        listed.location = "Porto".into();
        let list = views(vec![plant(1), listed.clone(), plant(3)], NOW, None);

        let adoptable = filter(&list, is_adoptable);
        assert_eq!(adoptable.len(), 1);
        assert_eq!(adoptable[0].record, listed);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_filter_on_derived_status() {
        let mut fresh = plant(1);
        fresh.last_proof_time = NOW - 86_400;
        let list = views(vec![fresh, plant(2)], NOW, None);
        let healthy = filter(&list, |v| v.status.is_healthy);
        assert_eq!(healthy.len(), 1);
        assert_eq!(healthy[0].record.id, 1);
    }

    #[test]
    fn test_labels_and_actions() {
        let mut record = plant(1);
        record.is_memorialized = true;
        let view = PlantView::new(record, NOW, Some(&addr(1)));
        assert_eq!(view.health_label(), "Memorial");
        assert!(!view.can_act());

        let view = PlantView::new(plant(2), NOW, Some(&addr(1)));
        assert_eq!(view.health_label(), "Needs Care");
        assert!(view.can_act());
    }

    #[test]
    fn test_photo_url() {
        assert_eq!(photo_url(None, ""), None);
        assert_eq!(
            photo_url(None, "bafy123").as_deref(),
            Some("https://gateway.pinata.cloud/ipfs/bafy123")
        );
        assert_eq!(
            photo_url(Some("my.mypinata.cloud"), "bafy123").as_deref(),
            Some("https://my.mypinata.cloud/ipfs/bafy123")
        );
    }
}
