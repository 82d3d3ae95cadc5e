//! Tour routes: CRUD, aliases, statistics and geo queries

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    middleware,
    routing::get,
    Router,
};
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::Value;

use super::reviews::{self, TOUR_PARAM};
use crate::entities::{tour, Role, TOUR};
use crate::error::{Error, Result};
use crate::handlers::{Envelope, Params, ResourceHandlers};
use crate::middleware::{protect, restrict_to, AllowedRoles};
use crate::state::AppState;
use crate::store::{
    format_timestamp, number, Accumulator, Filter, GeoNear, GeoPoint, Group, GroupKey, Op,
    Projection, SortKey, Stage,
};

/// Earth radius in miles, for converting distances to radians
const EARTH_RADIUS_MI: f64 = 3963.2;
/// Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6378.1;
/// Meters to miles
const METERS_TO_MI: f64 = 0.000621371;
/// Meters to kilometers
const METERS_TO_KM: f64 = 0.001;

const BAD_LATLNG: &str = "Please provide latitude and longitude in the format lat,lng.";

fn handlers() -> ResourceHandlers {
    ResourceHandlers::new(TOUR)
        .id_param(TOUR_PARAM)
        .populate(tour::reviews())
}

/// Tour routes, mounted at `/api/v1/tours`
pub fn router(state: &AppState) -> Router<AppState> {
    let tours = handlers();
    let authenticated = || middleware::from_fn_with_state(state.clone(), protect);
    let staff = || {
        middleware::from_fn_with_state(AllowedRoles(&[Role::Admin, Role::LeadGuide]), restrict_to)
    };

    Router::new()
        .route(
            "/",
            tours.get_all().merge(
                tours
                    .create_one()
                    .route_layer(staff())
                    .route_layer(authenticated()),
            ),
        )
        .route("/top-5-cheap", get(top_five_cheap))
        .route("/tour-stats", get(tour_stats))
        .route(
            "/monthly-plan/{year}",
            get(monthly_plan)
                .route_layer(middleware::from_fn_with_state(
                    AllowedRoles(&[Role::Admin, Role::LeadGuide, Role::Guide]),
                    restrict_to,
                ))
                .route_layer(authenticated()),
        )
        .route(
            "/tours-within/{distance}/center/{latlng}/unit/{unit}",
            get(tours_within),
        )
        .route("/distances/{latlng}/unit/{unit}", get(distances))
        .route(
            "/{tour_id}",
            tours.get_one().merge(
                tours
                    .update_one()
                    .merge(tours.delete_one())
                    .route_layer(staff())
                    .route_layer(authenticated()),
            ),
        )
        .nest("/{tour_id}/reviews", reviews::router(state))
}

/// `GET /top-5-cheap`: best rated, then cheapest
async fn top_five_cheap(State(state): State<AppState>, Params(mut params): Params) -> Result<Envelope> {
    params.set("limit", "5");
    params.set("sort", "-ratingsAverage,price");
    params.set("field", "name,price,ratingsAverage,summary,difficulty");
    handlers().list(&state, &HashMap::new(), params).await
}

/// `GET /tour-stats`: well-rated tours grouped by difficulty
async fn tour_stats(State(state): State<AppState>) -> Result<Envelope> {
    let stages = vec![
        Stage::Match(Filter::new().and("ratingsAverage", Op::Gte(number(4.5)))),
        Stage::Group(Group {
            key: GroupKey::Upper("difficulty".into()),
            fields: vec![
                ("numTours".into(), Accumulator::Count),
                ("numRatings".into(), Accumulator::Sum("ratingsQuantity".into())),
                ("avgRating".into(), Accumulator::Avg("ratingsAverage".into())),
                ("avgPrice".into(), Accumulator::Avg("price".into())),
                ("minPrice".into(), Accumulator::Min("price".into())),
                ("maxPrice".into(), Accumulator::Max("price".into())),
            ],
        }),
        Stage::Sort(vec![SortKey::asc("avgPrice")]),
    ];
    let stats = state.db().model(TOUR)?.aggregate(stages).await?;
    Ok(Envelope::data("stats", stats.into_iter().map(Value::Object).collect::<Vec<_>>()))
}

/// `GET /monthly-plan/{year}`: tour starts per month, busiest first
async fn monthly_plan(State(state): State<AppState>, Path(year): Path<String>) -> Result<Envelope> {
    let year: i32 = year
        .parse()
        .map_err(|_| Error::BadRequest(format!("Invalid year: {}", year)))?;
    let start_of = |y: i32| {
        NaiveDate::from_ymd_opt(y, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|at| format_timestamp(Utc.from_utc_datetime(&at)))
            .ok_or_else(|| Error::BadRequest(format!("Invalid year: {}", y)))
    };
    let (from, until) = (start_of(year)?, start_of(year + 1)?);

    let stages = vec![
        Stage::Unwind("startDates".into()),
        Stage::Match(
            Filter::new()
                .and("startDates", Op::Gte(Value::String(from)))
                .and("startDates", Op::Lt(Value::String(until))),
        ),
        Stage::Group(Group {
            key: GroupKey::Month("startDates".into()),
            fields: vec![
                ("numTourStarts".into(), Accumulator::Count),
                ("tours".into(), Accumulator::Push("name".into())),
            ],
        }),
        Stage::Set {
            field: "month".into(),
            from: "_id".into(),
        },
        Stage::Project(Projection::Exclude(vec!["_id".into()])),
        Stage::Sort(vec![SortKey::desc("numTourStarts")]),
        Stage::Limit(12),
    ];
    let plan = state.db().model(TOUR)?.aggregate(stages).await?;
    Ok(Envelope::data("plan", plan.into_iter().map(Value::Object).collect::<Vec<_>>()))
}

/// Distance unit in a geo route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Miles,
    Kilometers,
}

impl Unit {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "mi" => Ok(Self::Miles),
            "km" => Ok(Self::Kilometers),
            _ => Err(Error::BadRequest("Please provide the unit as mi or km.".to_string())),
        }
    }

    fn earth_radius(self) -> f64 {
        match self {
            Self::Miles => EARTH_RADIUS_MI,
            Self::Kilometers => EARTH_RADIUS_KM,
        }
    }

    fn from_meters(self) -> f64 {
        match self {
            Self::Miles => METERS_TO_MI,
            Self::Kilometers => METERS_TO_KM,
        }
    }
}

/// Parse `lat,lng` into a point
fn parse_latlng(raw: &str) -> Result<GeoPoint> {
    let bad = || Error::BadRequest(BAD_LATLNG.to_string());
    let (lat, lng) = raw.split_once(',').ok_or_else(bad)?;
    let lat: f64 = lat.trim().parse().map_err(|_| bad())?;
    let lng: f64 = lng.trim().parse().map_err(|_| bad())?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(bad());
    }
    Ok(GeoPoint::new(lng, lat))
}

/// `GET /tours-within/{distance}/center/{latlng}/unit/{unit}`
async fn tours_within(
    State(state): State<AppState>,
    Path((distance, latlng, unit)): Path<(String, String, String)>,
) -> Result<Envelope> {
    let center = parse_latlng(&latlng)?;
    let unit = Unit::parse(&unit)?;
    let distance: f64 = distance
        .parse()
        .ok()
        .filter(|d: &f64| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| Error::BadRequest(format!("Invalid distance: {}", distance)))?;

    let radius = distance / unit.earth_radius();
    let tours = state
        .db()
        .model(TOUR)?
        .find()
        .and("startLocation", Op::GeoWithin { center, radius })
        .exec()
        .await?;
    Ok(Envelope::list(tours))
}

/// `GET /distances/{latlng}/unit/{unit}`: nearest first
async fn distances(
    State(state): State<AppState>,
    Path((latlng, unit)): Path<(String, String)>,
) -> Result<Envelope> {
    let near = parse_latlng(&latlng)?;
    let unit = Unit::parse(&unit)?;
    let stages = vec![
        Stage::GeoNear(GeoNear {
            near,
            key: "startLocation".into(),
            distance_field: "distance".into(),
            distance_multiplier: unit.from_meters(),
        }),
        Stage::Project(Projection::Include(vec!["distance".into(), "name".into()])),
    ];
    let distances = state.db().model(TOUR)?.aggregate(stages).await?;
    Ok(Envelope::list(distances))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_latlng() {
        let point = parse_latlng("34.11,-118.11").unwrap();
        assert_eq!(point, GeoPoint::new(-118.11, 34.11));
        assert!(matches!(parse_latlng("34.11"), Err(Error::BadRequest(m)) if m == BAD_LATLNG));
        assert!(parse_latlng("abc,1").is_err());
        assert!(parse_latlng("91,0").is_err());
    }

    #[test]
    fn test_units() {
        assert_eq!(Unit::parse("mi").unwrap().earth_radius(), EARTH_RADIUS_MI);
        assert_eq!(Unit::parse("km").unwrap().from_meters(), METERS_TO_KM);
        assert!(Unit::parse("ft").is_err());
    }
}
