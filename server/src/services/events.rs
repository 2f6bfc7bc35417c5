//! Event management: creation with categories, layout and promo codes;
//! updates; cascading deletion.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::types::Json;
use uuid::Uuid;

use super::inventory::{categories_of, check_ticket_type_fields};
use super::promo::{check_new_code, PromoCodeInput};
use super::{load_event, CascadePolicy, DomainError, PromoValidator};
use crate::auth::AuthContext;
use crate::models::{CategoryRef, Event, EventStatus, Role, SectionAssignment, TicketType};
use crate::store::{CascadeReport, EventFilter, Store};
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicketCategory {
    pub category: String,
    pub price: Decimal,
    pub max_tickets_per_category: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionInput {
    pub section: String,
    pub category: CategoryRef,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEvent {
    pub name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub description: Option<String>,
    pub poster_url: Option<String>,
    pub status: Option<EventStatus>,
    /// Admins may create on behalf of an organizer.
    pub organizer_id: Option<Uuid>,
    #[serde(default)]
    pub ticket_categories: Vec<NewTicketCategory>,
    #[serde(default)]
    pub seating_layout: Vec<SectionInput>,
    #[serde(default)]
    pub promo_codes: Vec<PromoCodeInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEvent {
    pub name: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub description: Option<String>,
    pub poster_url: Option<String>,
    pub status: Option<EventStatus>,
    pub seating_layout: Option<Vec<SectionInput>>,
}

/// Resolves section references against the event's ticket types. Names
/// match case-insensitively; ids must belong to the event.
pub fn resolve_layout(
    ticket_types: &[TicketType],
    layout: &[SectionInput],
) -> AppResult<Vec<SectionAssignment>> {
    let mut sections = HashSet::new();
    layout
        .iter()
        .map(|input| {
            let section = input.section.trim();
            if section.is_empty() {
                return Err(AppError::ValidationError("section must not be empty".into()));
            }
            if !sections.insert(section.to_lowercase()) {
                return Err(AppError::ValidationError(format!(
                    "section '{section}' appears more than once"
                )));
            }
            let ticket_type = match &input.category {
                CategoryRef::Name(name) => ticket_types
                    .iter()
                    .find(|t| t.category.eq_ignore_ascii_case(name.trim())),
                CategoryRef::Id(id) => ticket_types.iter().find(|t| t.id == *id),
            }
            .ok_or_else(|| {
                AppError::ValidationError(format!(
                    "section '{section}' refers to an unknown ticket category"
                ))
            })?;
            Ok(SectionAssignment {
                section: section.to_string(),
                ticket_type_id: Some(ticket_type.id),
            })
        })
        .collect()
}

pub struct EventService {
    store: Arc<dyn Store>,
    promos: PromoValidator,
}

impl EventService {
    pub fn new(store: Arc<dyn Store>, promos: PromoValidator) -> Self {
        Self { store, promos }
    }

    /// Creates the event with its ticket types and promo codes. All input is
    /// checked before the first write.
    pub async fn create(&self, ctx: &AuthContext, input: CreateEvent) -> AppResult<Event> {
        ctx.require_role(&[Role::Organizer, Role::Admin])?;
        let organizer_id = self.owner_for(ctx, input.organizer_id).await?;

        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::ValidationError("name must not be empty".into()));
        }

        let now = Utc::now();
        let event_id = Uuid::new_v4();

        let mut seen = HashSet::new();
        let mut ticket_types = Vec::with_capacity(input.ticket_categories.len());
        for category in &input.ticket_categories {
            check_ticket_type_fields(&category.category, category.price, category.max_tickets_per_category)?;
            let label = category.category.trim().to_string();
            if !seen.insert(label.to_lowercase()) {
                return Err(AppError::ValidationError(format!(
                    "ticket category '{label}' appears more than once"
                )));
            }
            ticket_types.push(TicketType {
                id: Uuid::new_v4(),
                event_id,
                category: label,
                price: category.price,
                max_tickets_per_category: category.max_tickets_per_category,
                tickets_sold: 0,
                created_at: now,
                updated_at: now,
            });
        }

        let layout = resolve_layout(&ticket_types, &input.seating_layout)?;

        let mut codes = HashSet::new();
        for promo in &input.promo_codes {
            let code = check_new_code(promo)?;
            if !codes.insert(code.clone()) {
                return Err(DomainError::DuplicateCode(code).into());
            }
        }

        let event = Event {
            id: event_id,
            organizer_id,
            name,
            date: input.date,
            time: input.time,
            description: input.description,
            poster_url: input.poster_url,
            status: input.status.unwrap_or(EventStatus::Upcoming),
            ticket_categories: Json(categories_of(&ticket_types)),
            seating_layout: Json(layout),
            promo_code_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_event(&event).await?;
        for ticket_type in &ticket_types {
            self.store.insert_ticket_type(ticket_type).await?;
        }
        for promo in &input.promo_codes {
            self.promos.insert_for_event(event.id, promo).await?;
        }

        tracing::info!(
            event_id = %event.id,
            organizer_id = %organizer_id,
            ticket_types = ticket_types.len(),
            promo_codes = input.promo_codes.len(),
            "Event created"
        );
        load_event(self.store.as_ref(), event.id).await
    }

    async fn owner_for(&self, ctx: &AuthContext, requested: Option<Uuid>) -> AppResult<Uuid> {
        match (ctx.role, requested) {
            (Role::Admin, Some(organizer_id)) => {
                let user = self
                    .store
                    .find_user(organizer_id)
                    .await?
                    .filter(|u| u.role == Role::Organizer)
                    .ok_or(DomainError::UserNotFound(organizer_id))?;
                Ok(user.id)
            }
            (Role::Organizer, Some(organizer_id)) if organizer_id != ctx.user_id => Err(
                AppError::Forbidden("organizers may only create their own events".into()),
            ),
            _ => Ok(ctx.user_id),
        }
    }

    pub async fn list(&self, filter: EventFilter) -> AppResult<Vec<Event>> {
        Ok(self.store.list_events(&filter).await?)
    }

    pub async fn get(&self, event_id: Uuid) -> AppResult<Event> {
        load_event(self.store.as_ref(), event_id).await
    }

    pub async fn update(&self, ctx: &AuthContext, event_id: Uuid, changes: UpdateEvent) -> AppResult<Event> {
        let mut event = load_event(self.store.as_ref(), event_id).await?;
        ctx.require_event_manager(event.organizer_id)?;

        if let Some(name) = changes.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AppError::ValidationError("name must not be empty".into()));
            }
            event.name = name;
        }
        if let Some(date) = changes.date {
            event.date = date;
        }
        if let Some(time) = changes.time {
            event.time = time;
        }
        if let Some(description) = changes.description {
            event.description = Some(description);
        }
        if let Some(poster_url) = changes.poster_url {
            event.poster_url = Some(poster_url);
        }
        if let Some(status) = changes.status {
            event.status = status;
        }
        if let Some(layout) = changes.seating_layout {
            let ticket_types = self.store.list_ticket_types(Some(event_id)).await?;
            event.seating_layout = Json(resolve_layout(&ticket_types, &layout)?);
        }
        event.updated_at = Utc::now();

        if !self.store.update_event(&event).await? {
            return Err(DomainError::EventNotFound(event_id).into());
        }
        tracing::info!(event_id = %event_id, "Event updated");
        load_event(self.store.as_ref(), event_id).await
    }

    pub async fn delete(&self, ctx: &AuthContext, event_id: Uuid) -> AppResult<CascadeReport> {
        let event = load_event(self.store.as_ref(), event_id).await?;
        ctx.require_event_manager(event.organizer_id)?;
        Ok(CascadePolicy::Event(event_id).execute(self.store.as_ref()).await?)
    }
}
