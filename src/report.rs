use crate::error::Result;
use crate::record::{PlantView, photo_url};
use csv::Writer;
use log::info;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

/// Flat CSV row; the stewardship chain is joined with `;`.
#[derive(Debug, Serialize)]
struct PlantRow<'a> {
    id: u64,
    name: &'a str,
    species: &'a str,
    current_steward: &'a str,
    status: &'static str,
    last_care: String,
    last_proof_time: u64,
    photo_url: String,
    memorialized: bool,
    up_for_adoption: bool,
    location: &'a str,
    stewards: String,
}

impl<'a> PlantRow<'a> {
    fn from_view(view: &'a PlantView, gateway: Option<&str>) -> Self {
        let r = &view.record;
        Self {
            id: r.id,
            name: &r.name,
            species: &r.species,
            current_steward: r.current_steward.as_str(),
            status: view.health_label(),
            last_care: view.status.care_label(),
            last_proof_time: r.last_proof_time,
            photo_url: photo_url(gateway, &r.latest_photo_ipfs).unwrap_or_default(),
            memorialized: r.is_memorialized,
            up_for_adoption: r.is_up_for_adoption,
            location: &r.location,
            stewards: r
                .stewards
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(";"),
        }
    }
}

pub fn save_to_csv(views: &[PlantView], gateway: Option<&str>, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    write_csv(views, gateway, file)?;
    info!("Data saved to {}", path.display());
    Ok(())
}

fn write_csv<W: std::io::Write>(views: &[PlantView], gateway: Option<&str>, out: W) -> Result<()> {
    let mut writer = Writer::from_writer(out);
    for view in views {
        writer.serialize(PlantRow::from_view(view, gateway))?;
    }
    writer.flush()?;
    Ok(())
}

fn to_json(views: &[PlantView], gateway: Option<&str>) -> Result<String> {
    let rows: Vec<PlantRow> = views.iter().map(|v| PlantRow::from_view(v, gateway)).collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}

pub fn print_json(views: &[PlantView], gateway: Option<&str>) -> Result<()> {
    println!("{}", to_json(views, gateway)?);
    Ok(())
}

pub fn print_plants(views: &[PlantView]) {
    for view in views {
        let r = &view.record;
        let mut line = format!(
            "#{:<5} {:<20} {:<24} {:<10} last care: {}",
            r.id,
            r.name,
            r.species,
            view.health_label(),
            view.status.care_label()
        );
        if r.is_up_for_adoption {
            line.push_str(&format!("  [adoptable: {}]", r.location));
        }
        if view.status.is_owner {
            line.push_str("  (yours)");
        }
        println!("{line}");
    }
}

pub fn print_detail(view: &PlantView, gateway: Option<&str>) {
    let r = &view.record;
    println!("{} ({})", r.name, r.species);
    println!("  Token:       #{}", r.id);
    println!("  Status:      {}", view.health_label());
    println!("  Last care:   {}", view.status.care_label());
    println!("  Steward:     {}", r.current_steward);
    match photo_url(gateway, &r.latest_photo_ipfs) {
        Some(url) => println!("  Photo:       {url}"),
        None => println!("  Photo:       none"),
    }
    if r.is_up_for_adoption {
        println!("  Adoption:    listed in {}", r.location);
    }
    println!("  History:");
    for (i, steward) in r.stewards.iter().enumerate() {
        let marker = if i + 1 == r.stewards.len() { " (current)" } else { "" };
        println!("    {}. {}{}", i + 1, steward, marker);
    }
    if view.can_act() {
        println!("  You are the steward: transfer, proof, memorialize and adopt-list are available.");
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub healthy: usize,
    pub needs_care: usize,
    pub memorialized: usize,
    pub adoptable: usize,
    pub species: usize,
}

pub fn summarize(views: &[PlantView]) -> Summary {
    let species: HashSet<&str> = views
        .iter()
        .map(|v| v.record.species.as_str())
        .filter(|s| !s.is_empty())
        .collect();
    let memorialized = views.iter().filter(|v| v.record.is_memorialized).count();
    let healthy = views
        .iter()
        .filter(|v| !v.record.is_memorialized && v.status.is_healthy)
        .count();
    Summary {
        total: views.len(),
        healthy,
        needs_care: views.len() - healthy - memorialized,
        memorialized,
        adoptable: views.iter().filter(|v| v.record.is_up_for_adoption).count(),
        species: species.len(),
    }
}

pub fn print_summary(views: &[PlantView]) {
    if views.is_empty() {
        println!("No plants to summarize");
        return;
    }
    let s = summarize(views);
    println!("\nSummary:");
    println!("Total plants: {}", s.total);
    println!("Healthy: {}  Needs care: {}  Memorial: {}", s.healthy, s.needs_care, s.memorialized);
    println!("Up for adoption: {}", s.adoptable);
    println!("Unique species: {}", s.species);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::{addr, plant};
    use crate::record::views;

    const NOW: u64 = 1_700_000_000;

    fn sample() -> Vec<PlantView> {
        let mut fresh = plant(1);
        fresh.last_proof_time = NOW - 2 * 86_400;
        fresh.latest_photo_ipfs = "bafy1".into();
        fresh.stewards = vec![addr(3), addr(1)];
        let mut memorial = plant(2);
        memorial.is_memorialized = true;
        memorial.species = "Ficus".into();
        let mut listed = plant(3);
        listed.is_up_for_adoption = true;
        listed.location = "Porto".into();
        views(vec![fresh, memorial, listed], NOW, Some(&addr(1)))
    }

    #[test]
    fn test_summary_counts() {
        assert_eq!(
            summarize(&sample()),
            Summary {
                total: 3,
                healthy: 1,
                needs_care: 1,
                memorialized: 1,
                adoptable: 1,
                species: 2,
            }
        );
    }

    #[test]
    fn test_csv_rows() {
        let mut out = Vec::new();
        write_csv(&sample(), None, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("id,name,species,current_steward,status,last_care"));
        assert!(lines[1].contains("Healthy,2 days ago"));
        assert!(lines[1].contains("https://gateway.pinata.cloud/ipfs/bafy1"));
        assert!(lines[1].contains(&format!("{};{}", addr(3), addr(1))));
        assert!(lines[2].contains("Memorial,Never"));
        assert!(lines[3].contains("Porto"));
    }

    #[test]
    fn test_json_rows() {
        let text = to_json(&sample(), Some("ipfs.example.org")).unwrap();
        let rows: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 3);
        assert_eq!(rows[0]["status"], "Healthy");
        assert_eq!(rows[0]["photo_url"], "https://ipfs.example.org/ipfs/bafy1");
        assert_eq!(rows[1]["memorialized"], true);
        assert_eq!(rows[2]["location"], "Porto");
    }
}
