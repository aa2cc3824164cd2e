//! In-memory `person` table and the handlers that serve it.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};

use batchrpc::{
    CallStyle, ExceptionMapping, FieldOrderings, FieldSpec, FieldType, GridSchema, HandlerCall,
    HandlerDescriptor, HandlerFailure, HandlerOutput, ParamSpec, ParamType, ReadRequest,
    RegistryBuilder, RegistryError, ReturnShape,
};

use super::DIRECTORY_VIEW;

const ACTION: &str = "person";

/// State codes accepted for [`Person::state`], with display names.
pub const STATES: &[(&str, &str)] = &[
    ("CA", "California"),
    ("IL", "Illinois"),
    ("MA", "Massachusetts"),
    ("NY", "New York"),
    ("OR", "Oregon"),
    ("TX", "Texas"),
    ("WA", "Washington"),
];

/// A row of the demonstration table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    /// Server-assigned identifier.
    pub id: i64,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Contact address.
    pub email: String,
    /// Two-letter state code.
    pub state: String,
}

/// Fields a client supplies when creating a person.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonDraft {
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Contact address.
    pub email: String,
    /// Two-letter state code.
    pub state: String,
}

impl PersonDraft {
    fn validate(&self) -> Result<(), HandlerFailure> {
        check_name("firstName", &self.first_name)?;
        check_name("lastName", &self.last_name)?;
        check_email(&self.email)?;
        check_state(&self.state)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonPatch {
    id: i64,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

impl PersonPatch {
    fn validate(&self) -> Result<(), HandlerFailure> {
        if let Some(first_name) = &self.first_name {
            check_name("firstName", first_name)?;
        }
        if let Some(last_name) = &self.last_name {
            check_name("lastName", last_name)?;
        }
        if let Some(email) = &self.email {
            check_email(email)?;
        }
        match &self.state {
            Some(state) => check_state(state),
            None => Ok(()),
        }
    }

    fn apply_to(self, person: &mut Person) {
        if let Some(first_name) = self.first_name {
            person.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            person.last_name = last_name;
        }
        if let Some(email) = self.email {
            person.email = email;
        }
        if let Some(state) = self.state {
            person.state = state;
        }
    }
}

#[derive(Debug)]
struct Table {
    people: Vec<Person>,
    next_id: i64,
}

impl Table {
    fn insert(&mut self, draft: PersonDraft) -> Person {
        let person = Person {
            id: self.next_id,
            first_name: draft.first_name,
            last_name: draft.last_name,
            email: draft.email,
            state: draft.state,
        };
        self.next_id = self.next_id.saturating_add(1);
        self.people.push(person.clone());
        person
    }

    fn update(&mut self, patch: PersonPatch) -> Option<Person> {
        let person = self.people.iter_mut().find(|person| person.id == patch.id)?;
        patch.apply_to(person);
        Some(person.clone())
    }

    fn remove(&mut self, ids: &[i64]) -> Vec<Person> {
        let (removed, kept): (Vec<Person>, Vec<Person>) = self
            .people
            .drain(..)
            .partition(|person| ids.contains(&person.id));
        self.people = kept;
        removed
    }
}

/// Thread-safe in-memory table of people.
#[derive(Debug)]
pub struct PersonStore {
    table: Mutex<Table>,
    orderings: FieldOrderings<Person>,
}

impl PersonStore {
    /// Creates a table holding `people`; new ids continue after the largest.
    #[must_use]
    pub fn new(people: Vec<Person>) -> Self {
        let next_id = people
            .iter()
            .map(|person| person.id)
            .max()
            .unwrap_or(0)
            .saturating_add(1);
        Self {
            table: Mutex::new(Table { people, next_id }),
            orderings: orderings(),
        }
    }

    /// Creates a table with a fixed sample of eight people.
    #[must_use]
    pub fn seeded() -> Self {
        let sample = [
            ("Ada", "Lovelace", "ada@example.org", "MA"),
            ("Grace", "Hopper", "grace@example.org", "NY"),
            ("Alan", "Turing", "alan@example.org", "CA"),
            ("Edsger", "Dijkstra", "edsger@example.org", "TX"),
            ("Barbara", "Liskov", "barbara@example.org", "MA"),
            ("Donald", "Knuth", "donald@example.org", "CA"),
            ("Margaret", "Hamilton", "margaret@example.org", "IL"),
            ("Ken", "Thompson", "ken@example.org", "OR"),
        ];
        let people = sample
            .into_iter()
            .zip(1_i64..)
            .map(|((first_name, last_name, email, state), id)| Person {
                id,
                first_name: first_name.to_owned(),
                last_name: last_name.to_owned(),
                email: email.to_owned(),
                state: state.to_owned(),
            })
            .collect();
        Self::new(people)
    }

    /// Copy of every row in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an `internal` failure when a previous writer panicked.
    pub fn snapshot(&self) -> Result<Vec<Person>, HandlerFailure> {
        Ok(self.lock()?.people.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Table>, HandlerFailure> {
        self.table
            .lock()
            .map_err(|_| HandlerFailure::new("internal", "person table is unavailable"))
    }

    fn load(&self, call: &HandlerCall<'_>) -> Result<HandlerOutput, HandlerFailure> {
        let unpaged = ReadRequest::default();
        let request = call.read_request().unwrap_or(&unpaged);
        let state = call.arguments().string("state");
        let rows: Vec<Person> = self
            .lock()?
            .people
            .iter()
            .filter(|person| selects(person, request, state))
            .cloned()
            .collect();
        HandlerOutput::store(call.store_processor().process(rows, request, &self.orderings))
    }

    fn find(&self, call: &HandlerCall<'_>) -> Result<HandlerOutput, HandlerFailure> {
        let id = call
            .arguments()
            .int("id")
            .ok_or_else(|| HandlerFailure::new("validation", "id is required"))?;
        let table = self.lock()?;
        let person = table
            .people
            .iter()
            .find(|person| person.id == id)
            .ok_or_else(|| not_found(id))?;
        HandlerOutput::single(person)
    }

    fn create(&self, call: &HandlerCall<'_>) -> Result<HandlerOutput, HandlerFailure> {
        let drafts: Vec<PersonDraft> = decode_records(call.records())?;
        drafts.iter().try_for_each(PersonDraft::validate)?;
        let mut table = self.lock()?;
        let created: Vec<Person> = drafts.into_iter().map(|draft| table.insert(draft)).collect();
        HandlerOutput::list(&created)
    }

    fn update(&self, call: &HandlerCall<'_>) -> Result<HandlerOutput, HandlerFailure> {
        let patches: Vec<PersonPatch> = decode_records(call.records())?;
        patches.iter().try_for_each(PersonPatch::validate)?;
        let mut table = self.lock()?;
        let updated: Vec<Person> = patches
            .into_iter()
            .filter_map(|patch| table.update(patch))
            .collect();
        HandlerOutput::list(&updated)
    }

    fn destroy(&self, call: &HandlerCall<'_>) -> Result<HandlerOutput, HandlerFailure> {
        let ids = call
            .records()
            .iter()
            .map(|record| {
                record
                    .as_i64()
                    .or_else(|| record.get("id").and_then(Value::as_i64))
                    .ok_or_else(|| HandlerFailure::new("validation", "each record needs an id"))
            })
            .collect::<Result<Vec<i64>, HandlerFailure>>()?;
        let removed = self.lock()?.remove(&ids);
        let deleted: Vec<i64> = ids
            .into_iter()
            .filter(|id| removed.iter().any(|person| person.id == *id))
            .collect();
        HandlerOutput::list(&deleted)
    }

    /// Distinct states of the people currently stored, by code.
    fn states(&self, _call: &HandlerCall<'_>) -> Result<HandlerOutput, HandlerFailure> {
        let table = self.lock()?;
        let present: BTreeSet<&str> = table
            .people
            .iter()
            .map(|person| person.state.as_str())
            .collect();
        let listed = STATES
            .iter()
            .filter(|(code, _)| present.contains(code))
            .map(|(code, name)| json!({"code": code, "name": name}))
            .collect();
        Ok(HandlerOutput::List(listed))
    }
}

fn orderings() -> FieldOrderings<Person> {
    FieldOrderings::new()
        .by_key("id", |person: &Person| person.id)
        .with("firstName", |left: &Person, right: &Person| {
            left.first_name.cmp(&right.first_name)
        })
        .with("lastName", |left: &Person, right: &Person| {
            left.last_name.cmp(&right.last_name)
        })
        .with("email", |left: &Person, right: &Person| left.email.cmp(&right.email))
        .with("state", |left: &Person, right: &Person| left.state.cmp(&right.state))
}

fn grid_schema() -> GridSchema {
    GridSchema::new()
        .field(
            FieldSpec::new("id", FieldType::Int)
                .header("ID")
                .width(40)
                .fixed(),
        )
        .field(
            FieldSpec::new("firstName", FieldType::String)
                .header("First name")
                .always_visible(),
        )
        .field(
            FieldSpec::new("lastName", FieldType::String)
                .header("Last name")
                .always_visible(),
        )
        .field(
            FieldSpec::new("email", FieldType::String)
                .header("Email")
                .width(200)
                .unsortable(),
        )
        .field(
            FieldSpec::new("state", FieldType::String)
                .header("State")
                .width(60),
        )
}

/// Whether `person` passes the free-text query, the `filter` list and the
/// `state` parameter.
fn selects(person: &Person, request: &ReadRequest, state: Option<&str>) -> bool {
    let query_matches = request.query().is_none_or(|query| {
        let needle = query.to_lowercase();
        [&person.first_name, &person.last_name, &person.email]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    });
    let filters_match = request.filters().iter().all(|filter| {
        match (filter.property(), filter.value()) {
            ("id", Value::Number(id)) => id.as_i64() == Some(person.id),
            (property, Value::String(expected)) => {
                text_field(person, property).is_some_and(|actual| actual.eq_ignore_ascii_case(expected))
            }
            _ => true,
        }
    });
    let state_matches = state.is_none_or(|code| person.state.eq_ignore_ascii_case(code));
    query_matches && filters_match && state_matches
}

fn text_field<'a>(person: &'a Person, property: &str) -> Option<&'a str> {
    match property {
        "firstName" => Some(person.first_name.as_str()),
        "lastName" => Some(person.last_name.as_str()),
        "email" => Some(person.email.as_str()),
        "state" => Some(person.state.as_str()),
        _ => None,
    }
}

fn decode_records<T: DeserializeOwned>(records: &[Value]) -> Result<Vec<T>, HandlerFailure> {
    if records.is_empty() {
        return Err(HandlerFailure::new("validation", "no records supplied"));
    }
    records
        .iter()
        .zip(1_usize..)
        .map(|(record, position)| {
            T::deserialize(record).map_err(|error| {
                HandlerFailure::new("validation", format!("record {position}: {error}"))
                    .with_source(error)
            })
        })
        .collect()
}

fn not_found(id: i64) -> HandlerFailure {
    HandlerFailure::new("not_found", format!("no person with id {id}"))
}

fn check_name(field: &str, value: &str) -> Result<(), HandlerFailure> {
    if value.trim().is_empty() {
        return Err(HandlerFailure::new(
            "validation",
            format!("{field} must not be blank"),
        ));
    }
    Ok(())
}

fn check_email(email: &str) -> Result<(), HandlerFailure> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(HandlerFailure::new(
            "validation",
            format!("{email:?} is not an email address"),
        )),
    }
}

fn check_state(state: &str) -> Result<(), HandlerFailure> {
    if STATES.iter().any(|(code, _)| *code == state) {
        return Ok(());
    }
    Err(HandlerFailure::new(
        "validation",
        format!("unknown state {state:?}"),
    ))
}

fn bind<F>(
    store: &Arc<PersonStore>,
    method: F,
) -> impl Fn(&HandlerCall<'_>) -> Result<HandlerOutput, HandlerFailure> + Send + Sync + 'static
where
    F: Fn(&PersonStore, &HandlerCall<'_>) -> Result<HandlerOutput, HandlerFailure>
        + Send
        + Sync
        + 'static,
{
    let shared = Arc::clone(store);
    move |call: &HandlerCall<'_>| method(&shared, call)
}

/// Registers every `person` method against `store`.
pub(super) fn register(
    builder: &mut RegistryBuilder,
    store: &Arc<PersonStore>,
) -> Result<(), RegistryError> {
    // Client mistakes are reported verbatim; anything else stays generic.
    let failures = ExceptionMapping::new()
        .passthrough("not_found", Some(ACTION))
        .passthrough("validation", Some(ACTION));

    builder.register_fn(
        HandlerDescriptor::new(ACTION, "load", CallStyle::StoreRead)
            .param(ParamSpec::optional("state", ParamType::String))
            .grid(grid_schema())
            .exceptions(failures.clone()),
        bind(store, PersonStore::load),
    )?;
    builder.register_fn(
        HandlerDescriptor::new(ACTION, "directory", CallStyle::StoreRead)
            .param(ParamSpec::optional("state", ParamType::String))
            .view(DIRECTORY_VIEW)
            .exceptions(failures.clone()),
        bind(store, PersonStore::load),
    )?;
    builder.register_fn(
        HandlerDescriptor::new(ACTION, "find", CallStyle::Simple)
            .param(ParamSpec::required("id", ParamType::Int))
            .exceptions(failures.clone()),
        bind(store, PersonStore::find),
    )?;
    builder.register_fn(
        HandlerDescriptor::new(ACTION, "create", CallStyle::StoreModify)
            .exceptions(failures.clone()),
        bind(store, PersonStore::create),
    )?;
    builder.register_fn(
        HandlerDescriptor::new(ACTION, "update", CallStyle::StoreModify)
            .exceptions(failures.clone()),
        bind(store, PersonStore::update),
    )?;
    builder.register_fn(
        HandlerDescriptor::new(ACTION, "destroy", CallStyle::StoreModify).exceptions(failures),
        bind(store, PersonStore::destroy),
    )?;
    builder.register_fn(
        HandlerDescriptor::new(ACTION, "getStates", CallStyle::Simple).returns(ReturnShape::List),
        bind(store, PersonStore::states),
    )
}
