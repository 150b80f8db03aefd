//! Explicit on-delete rules for every foreign key in the schema.
//!
//! The schema itself declares no `ON DELETE` actions. Deleting a row means
//! expanding [`FOREIGN_KEYS`] into a [`DeletePlan`] and executing its steps in
//! order; both store backends execute the same plan.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Users,
    Groups,
    Posts,
    Comments,
    Follows,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Groups => "groups",
            Table::Posts => "posts",
            Table::Comments => "comments",
            Table::Follows => "follows",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    /// Delete the referencing rows too.
    Cascade,
    /// Keep the referencing rows and clear the reference.
    SetNull,
}

#[derive(Debug, Clone, Copy)]
pub struct ForeignKey {
    pub child: Table,
    pub column: &'static str,
    pub parent: Table,
    pub on_delete: OnDelete,
}

pub const FOREIGN_KEYS: &[ForeignKey] = &[
    ForeignKey {
        child: Table::Posts,
        column: "author_id",
        parent: Table::Users,
        on_delete: OnDelete::Cascade,
    },
    ForeignKey {
        child: Table::Posts,
        column: "group_id",
        parent: Table::Groups,
        on_delete: OnDelete::SetNull,
    },
    ForeignKey {
        child: Table::Comments,
        column: "author_id",
        parent: Table::Users,
        on_delete: OnDelete::Cascade,
    },
    ForeignKey {
        child: Table::Comments,
        column: "post_id",
        parent: Table::Posts,
        on_delete: OnDelete::SetNull,
    },
    ForeignKey {
        child: Table::Follows,
        column: "user_id",
        parent: Table::Users,
        on_delete: OnDelete::Cascade,
    },
    ForeignKey {
        child: Table::Follows,
        column: "author_id",
        parent: Table::Users,
        on_delete: OnDelete::Cascade,
    },
];

/// A set of row ids, described relative to the id being deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The id passed to the delete call.
    Root,
    /// `SELECT id FROM table WHERE column IN (within)`
    Referencing {
        table: Table,
        column: &'static str,
        within: Box<Selection>,
    },
}

impl Selection {
    /// Renders the selection as a SQL id list. The root id is bound as `$1`.
    pub fn to_sql(&self) -> String {
        match self {
            Selection::Root => "$1".to_string(),
            Selection::Referencing {
                table,
                column,
                within,
            } => format!(
                "SELECT id FROM {} WHERE {} IN ({})",
                table.name(),
                column,
                within.to_sql()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteStep {
    /// `UPDATE table SET column = NULL WHERE column IN (selection)`
    Nullify {
        table: Table,
        column: &'static str,
        selection: Selection,
    },
    /// `DELETE FROM table WHERE column IN (selection)`
    Remove {
        table: Table,
        column: &'static str,
        selection: Selection,
    },
}

impl DeleteStep {
    pub fn to_sql(&self) -> String {
        match self {
            DeleteStep::Nullify {
                table,
                column,
                selection,
            } => format!(
                "UPDATE {table} SET {column} = NULL WHERE {column} IN ({sel})",
                table = table.name(),
                column = column,
                sel = selection.to_sql()
            ),
            DeleteStep::Remove {
                table,
                column,
                selection,
            } => format!(
                "DELETE FROM {} WHERE {} IN ({})",
                table.name(),
                column,
                selection.to_sql()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePlan {
    pub table: Table,
    pub steps: Vec<DeleteStep>,
}

/// Expands the foreign-key rules into ordered steps that delete one row of
/// `table`. Children are handled before their parent so every selection is
/// evaluated while the rows it walks through still exist.
pub fn plan_delete(table: Table) -> DeletePlan {
    let mut steps = Vec::new();
    dependents(table, &Selection::Root, &mut steps);
    steps.push(DeleteStep::Remove {
        table,
        column: "id",
        selection: Selection::Root,
    });
    DeletePlan { table, steps }
}

fn dependents(parent: Table, parent_ids: &Selection, steps: &mut Vec<DeleteStep>) {
    for fk in FOREIGN_KEYS.iter().filter(|fk| fk.parent == parent) {
        match fk.on_delete {
            OnDelete::SetNull => steps.push(DeleteStep::Nullify {
                table: fk.child,
                column: fk.column,
                selection: parent_ids.clone(),
            }),
            OnDelete::Cascade => {
                let child_ids = Selection::Referencing {
                    table: fk.child,
                    column: fk.column,
                    within: Box::new(parent_ids.clone()),
                };
                dependents(fk.child, &child_ids, steps);
                steps.push(DeleteStep::Remove {
                    table: fk.child,
                    column: fk.column,
                    selection: parent_ids.clone(),
                });
            }
        }
    }
}
