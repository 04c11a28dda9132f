//! Output table shapes, declared once
//!
//! These definitions drive both the SQLite DDL and the machine-readable
//! data dictionary, so the published schema and its documentation cannot
//! drift apart.

/// One output column: physical shape plus business meaning
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub definition: &'static str,
    pub formula: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    pub fields: &'static [FieldDef],
}

impl TableDef {
    pub fn create_sql(&self) -> String {
        let columns: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("{} {}", f.name, f.sql_type))
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.name,
            columns.join(", ")
        )
    }

    pub fn insert_sql(&self) -> String {
        let names: Vec<&str> = self.fields.iter().map(|f| f.name).collect();
        let placeholders: Vec<String> =
            (1..=self.fields.len()).map(|i| format!("?{}", i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.name,
            names.join(", "),
            placeholders.join(", ")
        )
    }
}

pub const RETENTION_CURVE: TableDef = TableDef {
    name: "retention_curve",
    fields: &[
        FieldDef {
            name: "cohort_month",
            sql_type: "TEXT NOT NULL",
            definition: "Calendar month (YYYY-MM, UTC) of the cohort's first qualifying revenue event",
            formula: "month(min(occurred_at) over revenue events per entity)",
        },
        FieldDef {
            name: "segment",
            sql_type: "TEXT NOT NULL",
            definition: "Customer segment the cohort belongs to (D2C or B2B)",
            formula: "entity segment at resolution time",
        },
        FieldDef {
            name: "period_offset",
            sql_type: "INTEGER NOT NULL",
            definition: "Whole months elapsed since the cohort month (0 = formation month)",
            formula: "month - cohort_month in calendar months",
        },
        FieldDef {
            name: "cohort_size",
            sql_type: "INTEGER NOT NULL",
            definition: "Entities acquired in the cohort month; fixed at formation, never recomputed",
            formula: "count(entities with first revenue event in cohort_month)",
        },
        FieldDef {
            name: "active_count",
            sql_type: "INTEGER NOT NULL",
            definition: "Cohort entities with at least one qualifying revenue event in the offset month",
            formula: "count(distinct entity where any revenue event in cohort_month + period_offset)",
        },
        FieldDef {
            name: "retention_rate",
            sql_type: "REAL NOT NULL",
            definition: "Share of the cohort still active in the offset month; re-engagement may raise it",
            formula: "active_count / cohort_size",
        },
        FieldDef {
            name: "run_id",
            sql_type: "TEXT NOT NULL",
            definition: "Identifier of the computation run that published this row",
            formula: "assigned at publish",
        },
    ],
};

pub const LTV: TableDef = TableDef {
    name: "ltv",
    fields: &[
        FieldDef {
            name: "entity_id",
            sql_type: "TEXT NOT NULL",
            definition: "Canonical entity identifier minted by the identity resolver",
            formula: "identity resolution over (source_system, source_key, hints)",
        },
        FieldDef {
            name: "as_of_month",
            sql_type: "TEXT NOT NULL",
            definition: "Calendar month (YYYY-MM, UTC) this row accounts for; rows exist only for months with events",
            formula: "month(occurred_at) per event",
        },
        FieldDef {
            name: "gross_revenue",
            sql_type: "REAL NOT NULL",
            definition: "Signed gross amount of the month's events; refunds are negative",
            formula: "sum(amount_gross) over events in month",
        },
        FieldDef {
            name: "net_revenue",
            sql_type: "REAL NOT NULL",
            definition: "Net revenue of the month; events without COGS or a rate are excluded until rated",
            formula: "sum(amount_gross - cogs - amount_discount), cogs = amount_cogs or amount_gross * rate(product_id)",
        },
        FieldDef {
            name: "cumulative_net_ltv",
            sql_type: "REAL NOT NULL",
            definition: "Running net LTV through end of month; decreases only through refund/correction events",
            formula: "sum(net_revenue) over months <= as_of_month",
        },
        FieldDef {
            name: "has_unresolved_exception",
            sql_type: "INTEGER NOT NULL",
            definition: "1 when the entity carries an unresolved conflict, orphan, or unrated product; caveat these rows",
            formula: "entity in flagged set of this run's exception ledger",
        },
        FieldDef {
            name: "run_id",
            sql_type: "TEXT NOT NULL",
            definition: "Identifier of the computation run that published this row",
            formula: "assigned at publish",
        },
    ],
};

pub const FUNNEL: TableDef = TableDef {
    name: "funnel",
    fields: &[
        FieldDef {
            name: "cohort_month",
            sql_type: "TEXT NOT NULL",
            definition: "Calendar month (YYYY-MM, UTC) of the entity's acquisition (first event of any kind)",
            formula: "month(min(occurred_at) per entity)",
        },
        FieldDef {
            name: "segment",
            sql_type: "TEXT NOT NULL",
            definition: "Customer segment (D2C or B2B)",
            formula: "entity segment at resolution time",
        },
        FieldDef {
            name: "stage",
            sql_type: "TEXT NOT NULL",
            definition: "Funnel stage: acquisition, activation, conversion, or repeat; inferred intermediate stages are counted",
            formula: "furthest-stage attribution per entity, intermediates backfilled as inferred",
        },
        FieldDef {
            name: "entity_count",
            sql_type: "INTEGER NOT NULL",
            definition: "Cohort entities that reached the stage (observed or inferred)",
            formula: "count(entities with a stage record)",
        },
        FieldDef {
            name: "conversion_from_prior_stage",
            sql_type: "REAL",
            definition: "Stage-to-stage conversion over entities old enough to have plausibly progressed; NULL for acquisition or empty denominators",
            formula: "mature_reached(stage) / mature_reached(prior stage)",
        },
        FieldDef {
            name: "run_id",
            sql_type: "TEXT NOT NULL",
            definition: "Identifier of the computation run that published this row",
            formula: "assigned at publish",
        },
    ],
};

pub const EXCEPTIONS: TableDef = TableDef {
    name: "exceptions",
    fields: &[
        FieldDef {
            name: "entity_id",
            sql_type: "TEXT",
            definition: "Affected entity, when attributable",
            formula: "carried from the triggering record",
        },
        FieldDef {
            name: "source_system",
            sql_type: "TEXT NOT NULL",
            definition: "Source system whose data triggered the exception",
            formula: "carried from the triggering record",
        },
        FieldDef {
            name: "kind",
            sql_type: "TEXT NOT NULL",
            definition: "MALFORMED_RECORD, UNRESOLVED_CONFLICT, ORPHAN_EVENT, UNRATED_PRODUCT, IDENTITY_MERGE_AMBIGUOUS, or IDENTITY_MERGE (audit)",
            formula: "validator / resolver / LTV engine classification",
        },
        FieldDef {
            name: "detail",
            sql_type: "TEXT NOT NULL",
            definition: "Human-readable description with the offending amounts or keys",
            formula: "built at detection",
        },
        FieldDef {
            name: "detected_at",
            sql_type: "INTEGER NOT NULL",
            definition: "Data-time of detection (Unix seconds, UTC) - the triggering record's timestamp, so re-runs reproduce it",
            formula: "occurred_at of the triggering event",
        },
        FieldDef {
            name: "run_id",
            sql_type: "TEXT NOT NULL",
            definition: "Identifier of the computation run that published this row",
            formula: "assigned at publish",
        },
    ],
};

pub const RUNS: TableDef = TableDef {
    name: "runs",
    fields: &[
        FieldDef {
            name: "run_id",
            sql_type: "TEXT PRIMARY KEY",
            definition: "Unique identifier of one all-or-nothing publish",
            formula: "run_<unix_millis> at publish",
        },
        FieldDef {
            name: "published_at",
            sql_type: "INTEGER NOT NULL",
            definition: "Wall-clock publish time (Unix seconds, UTC); the only non-reproducible fields are this and run_id",
            formula: "clock at publish",
        },
        FieldDef {
            name: "config_json",
            sql_type: "TEXT NOT NULL",
            definition: "The externally supplied parameters (grace window, fuzzy threshold, windows) this run computed under",
            formula: "serialized RunConfig",
        },
    ],
};

pub const ALL_TABLES: [&TableDef; 5] = [&RETENTION_CURVE, &LTV, &FUNNEL, &EXCEPTIONS, &RUNS];
