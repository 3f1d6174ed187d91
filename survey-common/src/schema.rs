//! Versioned survey schema registry
//!
//! Every edition of the survey is a [`SchemaVersion`] with its own field list.
//! Field definitions are static tables: the form renderer, the record
//! validator, the relational column set and the dashboard all read from here.

use serde::Serialize;

/// Affirmative answer of a yes/no question
pub const YES: &str = "Sì";
/// Negative answer of a yes/no question
pub const NO: &str = "No";

const YES_NO_OPTIONS: &[&str] = &[YES, NO];

/// Kind of answer a field accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Single choice between "Sì" and "No"
    YesNo,
    /// Single choice from a fixed option set
    SingleChoice { options: &'static [&'static str] },
    /// Ordered selection of distinct options, bounded in size
    MultiChoice {
        options: &'static [&'static str],
        max_selections: usize,
    },
    /// Optional free-text notes
    FreeText,
}

impl FieldKind {
    /// Options accepted by choice fields (empty for free text)
    pub fn options(&self) -> &'static [&'static str] {
        match self {
            FieldKind::YesNo => YES_NO_OPTIONS,
            FieldKind::SingleChoice { options } => options,
            FieldKind::MultiChoice { options, .. } => options,
            FieldKind::FreeText => &[],
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, FieldKind::MultiChoice { .. })
    }
}

/// One question of a survey edition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    /// Answer key, also the relational column name
    pub key: &'static str,
    /// Question text shown on the form and the dashboard
    pub label: &'static str,
    /// Section heading the question belongs to
    pub section: &'static str,
    pub kind: FieldKind,
    /// Whether a submission must answer this question
    pub required: bool,
}

impl FieldSpec {
    pub const fn yes_no(key: &'static str, label: &'static str, section: &'static str) -> Self {
        Self {
            key,
            label,
            section,
            kind: FieldKind::YesNo,
            required: true,
        }
    }

    pub const fn single_choice(
        key: &'static str,
        label: &'static str,
        section: &'static str,
        options: &'static [&'static str],
    ) -> Self {
        Self {
            key,
            label,
            section,
            kind: FieldKind::SingleChoice { options },
            required: true,
        }
    }

    pub const fn multi_choice(
        key: &'static str,
        label: &'static str,
        section: &'static str,
        options: &'static [&'static str],
        max_selections: usize,
    ) -> Self {
        Self {
            key,
            label,
            section,
            kind: FieldKind::MultiChoice {
                options,
                max_selections,
            },
            required: false,
        }
    }

    pub const fn free_text(key: &'static str, label: &'static str, section: &'static str) -> Self {
        Self {
            key,
            label,
            section,
            kind: FieldKind::FreeText,
            required: false,
        }
    }
}

/// Full definition of one survey edition
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SurveySchema {
    pub version: SchemaVersion,
    pub title: &'static str,
    pub fields: &'static [FieldSpec],
}

impl SurveySchema {
    pub fn field(&self, key: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Section titles in first-appearance order
    pub fn sections(&self) -> Vec<&'static str> {
        let mut sections: Vec<&'static str> = Vec::new();
        for field in self.fields {
            if !sections.contains(&field.section) {
                sections.push(field.section);
            }
        }
        sections
    }
}

/// Registered survey editions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "&'static str")]
pub enum SchemaVersion {
    /// AML Board Member questionnaire
    BoardMemberV1,
    /// EU AML Package questionnaire
    AmlPackageV2,
}

impl SchemaVersion {
    /// Edition served when a request does not name one
    pub const LATEST: SchemaVersion = SchemaVersion::AmlPackageV2;

    pub fn all() -> &'static [SchemaVersion] {
        &[SchemaVersion::BoardMemberV1, SchemaVersion::AmlPackageV2]
    }

    /// Stable identifier stored with every record
    pub fn id(&self) -> &'static str {
        match self {
            SchemaVersion::BoardMemberV1 => "board_member_v1",
            SchemaVersion::AmlPackageV2 => "aml_package_v2",
        }
    }

    pub fn parse(id: &str) -> Option<SchemaVersion> {
        Self::all().iter().copied().find(|v| v.id() == id.trim())
    }

    pub fn schema(&self) -> &'static SurveySchema {
        match self {
            SchemaVersion::BoardMemberV1 => &BOARD_MEMBER_V1,
            SchemaVersion::AmlPackageV2 => &AML_PACKAGE_V2,
        }
    }

    /// Guess the edition of a record that carries no version tag.
    ///
    /// Keys that only exist in later editions decide; everything else is
    /// attributed to the first edition.
    pub fn infer<'a>(keys: impl IntoIterator<Item = &'a str>) -> SchemaVersion {
        let v1 = BOARD_MEMBER_V1.fields;
        let later_only = |key: &str| {
            v1.iter().all(|f| f.key != key) && AML_PACKAGE_V2.field(key).is_some()
        };

        if keys.into_iter().any(later_only) {
            SchemaVersion::AmlPackageV2
        } else {
            SchemaVersion::BoardMemberV1
        }
    }
}

impl From<SchemaVersion> for &'static str {
    fn from(version: SchemaVersion) -> Self {
        version.id()
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Union of field specs over every edition, first definition of a key wins.
///
/// Drives the relational column set.
pub fn all_fields() -> Vec<&'static FieldSpec> {
    let mut fields: Vec<&'static FieldSpec> = Vec::new();
    for version in SchemaVersion::all() {
        for field in version.schema().fields {
            if fields.iter().all(|f| f.key != field.key) {
                fields.push(field);
            }
        }
    }
    fields
}

// ============================================================================
// Edition definitions
// ============================================================================

const SECTION_GOVERNANCE: &str = "Nuova governance AML";
const SECTION_ADOPTION: &str = "01. Adeguamento ad EU AML Package";
const SECTION_IMPACTS: &str = "02. Principali impatti attesi dall'EU AML Package";
const SECTION_GOVERNANCE_V2: &str = "03. Nuova governance AML";

const NOMINEE_OPTIONS: &[&str] = &[
    "Amministratore Delegato",
    "Altro membro esecutivo del Consiglio di Amministrazione",
    "Membro non esecutivo del Consiglio di Amministrazione (che diventa esecutivo a seguito della nomina)",
    "Non ancora definito",
];

const BOARD_MEMBER_IMPACT_OPTIONS: &[&str] = &[
    "AML Governance",
    "Budget",
    "Formazione",
    "Implementazioni informatiche",
    "Outsourcing",
    "Risorse interne",
    "Supervisione diretta",
    "Tempistiche di adeguamento",
];

const AML_PACKAGE_IMPACT_OPTIONS: &[&str] = &[
    "Supervisione diretta",
    "Tempistiche di adeguamento",
    "Complessità del quadro normativo",
    "Implementazioni informatiche",
    "AML Governance",
    "Risk assessment",
    "Data model",
    "Know your customer",
    "Transaction monitoring",
    "Targeted financial sanctions",
    "Paesi terzi ad alto rischio",
    "Requisiti sulla titolarità effettiva",
    "Protezione e condivisione dei dati",
    "Outsourcing",
    "Misure amministrative e sanzioni",
    "Nessun impatto identificato al momento",
];

/// Maximum selections on multi-choice questions
pub const MAX_IMPACT_SELECTIONS: usize = 3;

static BOARD_MEMBER_V1: SurveySchema = SurveySchema {
    version: SchemaVersion::BoardMemberV1,
    title: "AML Board Member",
    fields: &[
        FieldSpec::yes_no(
            "bm_yes_no",
            "Si è già provveduto a nominare l’AML Board Member?",
            SECTION_GOVERNANCE,
        ),
        FieldSpec::single_choice(
            "bm_nominee",
            "Quale soggetto è stato nominato (o si prevede di nominare) come AML Board Member?",
            SECTION_GOVERNANCE,
            NOMINEE_OPTIONS,
        ),
        FieldSpec::multi_choice(
            "impacts",
            "Quali sono i principali impatti attesi dalla nomina (selezionare fino a 3 opzioni)?",
            SECTION_GOVERNANCE,
            BOARD_MEMBER_IMPACT_OPTIONS,
            MAX_IMPACT_SELECTIONS,
        ),
        FieldSpec::free_text("bm_notes", "Note", SECTION_GOVERNANCE),
    ],
};

static AML_PACKAGE_V2: SurveySchema = SurveySchema {
    version: SchemaVersion::AmlPackageV2,
    title: "EU AML Package",
    fields: &[
        FieldSpec::yes_no(
            "gap_analysis",
            "È stata già avviata una gap analysis su EU AML Package?",
            SECTION_ADOPTION,
        ),
        FieldSpec::yes_no(
            "board_inform",
            "Il Consiglio di Amministrazione è stato già informato dell’avvio dell’EU AML Package e delle imminenti novità normative in materia?",
            SECTION_ADOPTION,
        ),
        FieldSpec::yes_no(
            "budget",
            "È stato già stanziato del budget dedicato alle attività di adeguamento all’EU AML Package?",
            SECTION_ADOPTION,
        ),
        FieldSpec::yes_no(
            "adeguamento_specifico",
            "Avete già avviato attività di adeguamento su requisiti specifici definiti dall’EU AML Package?",
            SECTION_ADOPTION,
        ),
        FieldSpec::multi_choice(
            "impacts",
            "Quali sono le principali preoccupazioni ed impatti attesi dal nuovo quadro normativo (selezionare fino a 3 opzioni)?",
            SECTION_IMPACTS,
            AML_PACKAGE_IMPACT_OPTIONS,
            MAX_IMPACT_SELECTIONS,
        ),
        FieldSpec::yes_no(
            "bm_yes_no",
            "Si è già provveduto a nominare l’AML Board Member?",
            SECTION_GOVERNANCE_V2,
        ),
        FieldSpec::single_choice(
            "bm_nominee",
            "Quale soggetto è stato nominato (o si prevede di nominare) come AML Board Member?",
            SECTION_GOVERNANCE_V2,
            NOMINEE_OPTIONS,
        ),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ids_round_trip() {
        for version in SchemaVersion::all() {
            assert_eq!(SchemaVersion::parse(version.id()), Some(*version));
            assert_eq!(version.schema().version, *version);
        }
        assert_eq!(SchemaVersion::parse("v0"), None);
    }

    #[test]
    fn test_latest_is_registered() {
        assert!(SchemaVersion::all().contains(&SchemaVersion::LATEST));
    }

    #[test]
    fn test_field_keys_unique_per_version() {
        for version in SchemaVersion::all() {
            let fields = version.schema().fields;
            for (i, field) in fields.iter().enumerate() {
                assert!(
                    fields[i + 1..].iter().all(|f| f.key != field.key),
                    "duplicate key {} in {}",
                    field.key,
                    version
                );
            }
        }
    }

    #[test]
    fn test_shared_keys_have_same_shape() {
        // Shared keys map onto one relational column
        let v1 = SchemaVersion::BoardMemberV1.schema();
        let v2 = SchemaVersion::AmlPackageV2.schema();
        for field in v1.fields {
            if let Some(other) = v2.field(field.key) {
                assert_eq!(field.kind.is_multi(), other.kind.is_multi(), "{}", field.key);
            }
        }
    }

    #[test]
    fn test_impacts_capped_at_three() {
        let field = SchemaVersion::LATEST.schema().field("impacts").unwrap();
        match field.kind {
            FieldKind::MultiChoice { max_selections, .. } => assert_eq!(max_selections, 3),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_infer_version_from_keys() {
        assert_eq!(
            SchemaVersion::infer(["bm_yes_no", "bm_nominee", "impacts"]),
            SchemaVersion::BoardMemberV1
        );
        assert_eq!(
            SchemaVersion::infer(["gap_analysis", "bm_yes_no"]),
            SchemaVersion::AmlPackageV2
        );
        assert_eq!(SchemaVersion::infer([]), SchemaVersion::BoardMemberV1);
    }

    #[test]
    fn test_all_fields_is_union() {
        let keys: Vec<&str> = all_fields().iter().map(|f| f.key).collect();
        assert_eq!(
            keys,
            vec![
                "bm_yes_no",
                "bm_nominee",
                "impacts",
                "bm_notes",
                "gap_analysis",
                "board_inform",
                "budget",
                "adeguamento_specifico",
            ]
        );
    }

    #[test]
    fn test_sections_in_order() {
        let sections = SchemaVersion::AmlPackageV2.schema().sections();
        assert_eq!(sections.len(), 3);
        assert!(sections[0].starts_with("01."));
        assert!(sections[2].starts_with("03."));
    }
}
