use async_trait::async_trait;

use routewatch_core::EvidenceItem;

use crate::provider::{SearchError, SearchProvider};

/// Offline provider used when no search gateway is configured. Serves a
/// fixed catalogue of EU road-transport sources keyed off the query text,
/// so demo runs and the doctor command work without network access.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticSearchProvider;

struct CannedSource {
    keywords: &'static [&'static str],
    url: &'static str,
    title: &'static str,
    snippet: &'static str,
    published_date: &'static str,
}

const CATALOGUE: &[CannedSource] = &[
    CannedSource {
        keywords: &["mobility", "posting", "rest", "transport", "driver"],
        url: "https://transport.ec.europa.eu/transport-modes/road/mobility-package-i_en",
        title: "Mobility Package I: driving time, rest periods and posting of drivers",
        snippet: "Rules on maximum driving times, mandatory rest periods, return of \
                  vehicles and posting of drivers in international road transport, with \
                  staged enforcement dates for hauliers operating across member states.",
        published_date: "2024-02-15",
    },
    CannedSource {
        keywords: &["tachograph", "regulation", "recording"],
        url: "https://eur-lex.europa.eu/eli/reg/2014/165/oj",
        title: "Regulation (EU) No 165/2014 on tachographs in road transport",
        snippet: "Smart tachograph version 2 installation requirements for vehicles used \
                  in international carriage, including the retrofit deadline for fleets \
                  first registered before June 2019.",
        published_date: "2024-01-08",
    },
    CannedSource {
        keywords: &["hazardous", "dangerous", "adr", "cargo"],
        url: "https://unece.org/transport/dangerous-goods/adr-2025-files",
        title: "ADR 2025: carriage of dangerous goods by road",
        snippet: "Consolidated ADR provisions covering classification, packaging, tank \
                  coding, orange-plate marking and driver training certificates for \
                  dangerous goods moved by road between contracting parties.",
        published_date: "2024-06-30",
    },
    CannedSource {
        keywords: &["cabotage", "haulage"],
        url: "https://transport.ec.europa.eu/transport-modes/road/haulage/cabotage_en",
        title: "Cabotage rules for road haulage operators in the EU",
        snippet: "Up to three cabotage operations are permitted within seven days of an \
                  international delivery; a four-day cooling-off period applies before \
                  the same vehicle may return to the host member state.",
        published_date: "2023-11-20",
    },
    CannedSource {
        keywords: &["toll", "vignette", "co2", "charging", "law"],
        url: "https://eur-lex.europa.eu/eli/dir/2022/362/oj",
        title: "Directive (EU) 2022/362: road charging and CO2-based tolls",
        snippet: "Member states are phasing in CO2-differentiated tolls for heavy goods \
                  vehicles, replacing time-based vignettes on the core TEN-T network and \
                  adjusting rates by emission class.",
        published_date: "2024-03-12",
    },
    CannedSource {
        keywords: &["driving", "time", "hours", "regulations"],
        url: "https://eur-lex.europa.eu/eli/reg/2006/561/oj",
        title: "Regulation (EC) No 561/2006 on driving times and rest periods",
        snippet: "Daily driving limited to nine hours with two weekly extensions to ten, \
                  weekly rest requirements and the prohibition on taking regular weekly \
                  rest in the vehicle cabin.",
        published_date: "2023-09-01",
    },
    CannedSource {
        keywords: &["perishable", "refrigerated", "atp", "foodstuffs", "temperature"],
        url: "https://unece.org/transport/transport-perishable-foodstuffs",
        title: "ATP Agreement: carriage of perishable foodstuffs",
        snippet: "Equipment certification, insulation classing and temperature recording \
                  requirements for refrigerated transport of perishable foodstuffs across \
                  ATP contracting states.",
        published_date: "2024-04-22",
    },
    CannedSource {
        keywords: &["customs", "border", "declaration", "transit"],
        url: "https://taxation-customs.ec.europa.eu/customs-4/union-customs-code_en",
        title: "Union Customs Code: formalities for goods crossing EU borders",
        snippet: "Electronic customs declarations, entry summary safety data and transit \
                  procedures applying to goods entering or leaving the customs territory \
                  of the Union.",
        published_date: "2024-05-17",
    },
    CannedSource {
        keywords: &["emission", "zone", "lez", "city", "urban"],
        url: "https://urbanaccessregulations.eu/countries-mainmenu-147",
        title: "Urban access regulations and low-emission zones in Europe",
        snippet: "City low-emission zones, Euro-class entry restrictions and diesel bans \
                  affecting delivery and heavy goods vehicles across European cities, \
                  with notification and camera enforcement details.",
        published_date: "2024-07-03",
    },
    CannedSource {
        keywords: &["logistics", "2024", "changes", "europe"],
        url: "https://transport.ec.europa.eu/news-events/news_en",
        title: "European Commission: mobility and transport news",
        snippet: "Announcements of adopted and upcoming legislation affecting road \
                  freight, including weights and dimensions revisions and greenhouse gas \
                  reporting obligations for large fleets.",
        published_date: "2024-08-01",
    },
];

#[async_trait]
impl SearchProvider for StaticSearchProvider {
    async fn search(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<EvidenceItem>, SearchError> {
        let normalized = query.to_lowercase();
        let mut matched: Vec<EvidenceItem> = CATALOGUE
            .iter()
            .filter(|source| source.keywords.iter().any(|keyword| normalized.contains(keyword)))
            .map(to_evidence)
            .collect();

        // A query outside the catalogue still returns something useful.
        if matched.is_empty() {
            matched = CATALOGUE.iter().take(3).map(to_evidence).collect();
        }

        matched.truncate(max_results as usize);
        Ok(matched)
    }
}

fn to_evidence(source: &CannedSource) -> EvidenceItem {
    EvidenceItem {
        url: source.url.to_string(),
        title: source.title.to_string(),
        snippet: source.snippet.to_string(),
        published_date: Some(source.published_date.to_string()),
    }
}
