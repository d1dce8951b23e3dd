//! Header detection: locating the columns we need among whatever an export
//! calls them.

/// A logical input column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    IndividualId,
    Name,
    FirstName,
    LastName,
    Group,
    Date,
    Status,
    AdmitDate,
    PayerSource,
    UrComments,
    NextReview,
    BillingComments,
}

impl Field {
    /// Columns without which a file is rejected.
    pub const REQUIRED: [Field; 2] = [Field::IndividualId, Field::Date];

    const ALL: [Field; 12] = [
        Field::IndividualId,
        Field::Name,
        Field::FirstName,
        Field::LastName,
        Field::Group,
        Field::Date,
        Field::Status,
        Field::AdmitDate,
        Field::PayerSource,
        Field::UrComments,
        Field::NextReview,
        Field::BillingComments,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Field::IndividualId => "individual id",
            Field::Name => "name",
            Field::FirstName => "first name",
            Field::LastName => "last name",
            Field::Group => "group",
            Field::Date => "date",
            Field::Status => "status",
            Field::AdmitDate => "admit date",
            Field::PayerSource => "payer source",
            Field::UrComments => "ur comments",
            Field::NextReview => "next review",
            Field::BillingComments => "billing comments",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Field::IndividualId => &[
                "individual id",
                "individualid",
                "id",
                "mr",
                "mrn",
                "mr number",
                "medical record number",
                "student id",
                "patient id",
                "member id",
                "participant id",
                "client id",
                "person id",
            ],
            Field::Name => &[
                "name",
                "individual name",
                "full name",
                "student name",
                "patient name",
                "participant name",
                "client name",
                "member name",
            ],
            Field::FirstName => &["first name", "firstname", "given name"],
            Field::LastName => &["last name", "lastname", "surname", "family name"],
            Field::Group => &[
                "group",
                "group id",
                "groupid",
                "group name",
                "program",
                "program code",
                "class",
                "class id",
                "cohort",
                "section",
                "track",
            ],
            Field::Date => &[
                "date",
                "attendance date",
                "session date",
                "service date",
                "class date",
                "day",
            ],
            Field::Status => &[
                "status",
                "attendance",
                "attendance status",
                "attendance code",
                "present",
                "mark",
            ],
            Field::AdmitDate => &["admit date", "admission", "admission date", "admitted", "intake date"],
            Field::PayerSource => &[
                "payer source",
                "payer",
                "payor",
                "payment method",
                "insurance",
                "funding source",
            ],
            Field::UrComments => &["ur comments", "ur comment", "ur review", "ur loc", "utilization review"],
            Field::NextReview => &["next review", "next review date"],
            Field::BillingComments => &[
                "billing comments",
                "billing comment",
                "comment",
                "comments",
            ],
        }
    }
}

/// Column positions for one file. Built from a header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub individual_id: Option<usize>,
    pub name: Option<usize>,
    pub first_name: Option<usize>,
    pub last_name: Option<usize>,
    pub group: Option<usize>,
    pub date: Option<usize>,
    pub status: Option<usize>,
    pub admit_date: Option<usize>,
    pub payer_source: Option<usize>,
    pub ur_comments: Option<usize>,
    pub next_review: Option<usize>,
    pub billing_comments: Option<usize>,
}

impl ColumnMap {
    /// Matches each header cell against the alias table. The first column
    /// matching a field wins and a column is never assigned twice.
    pub fn from_header<S: AsRef<str>>(header: &[S]) -> Self {
        let normalized: Vec<String> = header.iter().map(|h| normalize_header(h.as_ref())).collect();
        let mut map = ColumnMap::default();
        let mut taken = vec![false; normalized.len()];

        for field in Field::ALL {
            let found = field.aliases().iter().find_map(|alias| {
                normalized
                    .iter()
                    .enumerate()
                    .find(|(i, h)| !taken[*i] && h.as_str() == *alias)
                    .map(|(i, _)| i)
            });
            if let Some(idx) = found {
                taken[idx] = true;
                *map.slot(field) = Some(idx);
            }
        }

        map
    }

    fn slot(&mut self, field: Field) -> &mut Option<usize> {
        match field {
            Field::IndividualId => &mut self.individual_id,
            Field::Name => &mut self.name,
            Field::FirstName => &mut self.first_name,
            Field::LastName => &mut self.last_name,
            Field::Group => &mut self.group,
            Field::Date => &mut self.date,
            Field::Status => &mut self.status,
            Field::AdmitDate => &mut self.admit_date,
            Field::PayerSource => &mut self.payer_source,
            Field::UrComments => &mut self.ur_comments,
            Field::NextReview => &mut self.next_review,
            Field::BillingComments => &mut self.billing_comments,
        }
    }

    pub fn get(&self, field: Field) -> Option<usize> {
        match field {
            Field::IndividualId => self.individual_id,
            Field::Name => self.name,
            Field::FirstName => self.first_name,
            Field::LastName => self.last_name,
            Field::Group => self.group,
            Field::Date => self.date,
            Field::Status => self.status,
            Field::AdmitDate => self.admit_date,
            Field::PayerSource => self.payer_source,
            Field::UrComments => self.ur_comments,
            Field::NextReview => self.next_review,
            Field::BillingComments => self.billing_comments,
        }
    }

    /// Labels of required fields that were not found.
    pub fn missing_required(&self) -> Vec<&'static str> {
        Field::REQUIRED
            .iter()
            .filter(|f| self.get(**f).is_none())
            .map(|f| f.label())
            .collect()
    }

    pub fn has_required(&self) -> bool {
        self.missing_required().is_empty()
    }

    /// An id column without a date column: usable when the date comes from
    /// the filename.
    fn is_dateless(&self) -> bool {
        self.individual_id.is_some() && self.date.is_none()
    }

    /// Number of recognised columns, used to pick the most plausible header
    /// when none qualifies.
    fn recognised(&self) -> usize {
        Field::ALL.iter().filter(|f| self.get(**f).is_some()).count()
    }
}

/// Finds the header among the first `scan_rows` rows.
///
/// A row carrying every required column wins. Failing that, and only when
/// `dateless_ok` is set, the first row with an id column is taken.
/// Otherwise returns the map of the most plausible candidate.
pub fn detect_header<'a, I, S>(
    rows: I,
    scan_rows: usize,
    dateless_ok: bool,
) -> Result<(usize, ColumnMap), ColumnMap>
where
    I: IntoIterator<Item = &'a [S]>,
    S: AsRef<str> + 'a,
{
    let mut best = ColumnMap::default();
    let mut dateless: Option<(usize, ColumnMap)> = None;
    for (idx, row) in rows.into_iter().take(scan_rows.max(1)).enumerate() {
        let map = ColumnMap::from_header(row);
        if map.has_required() {
            return Ok((idx, map));
        }
        if dateless_ok && dateless.is_none() && map.is_dateless() {
            dateless = Some((idx, map.clone()));
        }
        if map.recognised() > best.recognised() {
            best = map;
        }
    }
    dateless.ok_or(best)
}

fn normalize_header(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .replace(['_', '-', '.'], " ")
        .replace('#', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
