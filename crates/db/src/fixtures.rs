use routewatch_core::domain::profile::{
    CargoCategory, CompanyProfile, ContactInfo, FleetVehicle, MonitoringPreferences, RoutePoint,
    TransportRoute, VehicleType,
};

use crate::repositories::{ProfileStore, RepositoryError, SqlProfileStore};
use crate::DbPool;

#[derive(Clone, Debug)]
pub struct SeedSummary {
    pub company_name: String,
    pub route_count: usize,
    pub vehicle_count: u32,
}

/// Demo carrier used by the seed command and by tests that need a valid
/// profile without caring about its details.
pub fn demo_profile() -> CompanyProfile {
    CompanyProfile {
        company_name: "Nordlicht Spedition GmbH".to_string(),
        contact: ContactInfo {
            email: "ops@nordlicht-spedition.example".to_string(),
            phone: "+49 40 555 0199".to_string(),
        },
        fleet: vec![
            FleetVehicle { vehicle_type: VehicleType::Truck, quantity: 12 },
            FleetVehicle { vehicle_type: VehicleType::Refrigerated, quantity: 5 },
            FleetVehicle { vehicle_type: VehicleType::SemiTrailer, quantity: 3 },
        ],
        routes: vec![
            TransportRoute {
                name: "Hamburg-Rotterdam".to_string(),
                origin: RoutePoint {
                    country_code: "DE".to_string(),
                    city: Some("Hamburg".to_string()),
                },
                destination: RoutePoint {
                    country_code: "NL".to_string(),
                    city: Some("Rotterdam".to_string()),
                },
                transit_countries: Vec::new(),
            },
            TransportRoute {
                name: "Muenchen-Milano".to_string(),
                origin: RoutePoint {
                    country_code: "DE".to_string(),
                    city: Some("Muenchen".to_string()),
                },
                destination: RoutePoint {
                    country_code: "IT".to_string(),
                    city: Some("Milano".to_string()),
                },
                transit_countries: vec!["AT".to_string()],
            },
        ],
        cargo_categories: vec![CargoCategory::Standard, CargoCategory::Perishable],
        monitoring_preferences: MonitoringPreferences {
            keywords: vec![
                "tachograph".to_string(),
                "cabotage".to_string(),
                "toll".to_string(),
            ],
            regions: vec![
                "DE".to_string(),
                "NL".to_string(),
                "IT".to_string(),
                "AT".to_string(),
            ],
        },
    }
}

/// Writes the demo profile so a fresh database has something to run the
/// pipeline against.
pub async fn seed_demo_profile(pool: &DbPool) -> Result<SeedSummary, RepositoryError> {
    let profile = demo_profile();
    SqlProfileStore::new(pool.clone()).store(&profile).await?;

    Ok(SeedSummary {
        company_name: profile.company_name.clone(),
        route_count: profile.routes.len(),
        vehicle_count: profile.fleet.iter().map(|vehicle| vehicle.quantity).sum(),
    })
}
