//! Cached summary builders.
//!
//! Each builder gathers current truth through the reader and resolver and
//! hands ordered rows to the renderer. Nothing here writes.

use crate::resolver::SubsetResolver;
use rubric_core::{
    Answer, Placement, QuestionLine, QuestionLineId, RubricResult, Study, StudyQuestionLine,
    SubsetDefinitionId,
};
use rubric_render::{
    render_sections, render_table, ColumnLayout, ColumnSpec, OrderKey, RenderedSection, Section,
    SummaryRow,
};
use rubric_storage::AssociationReader;
use std::collections::BTreeSet;

// ============================================================================
// LAYOUTS
// ============================================================================

/// Question line answer summary: every attached list and every answer.
pub fn answer_summary_layout() -> ColumnLayout {
    ColumnLayout::new(vec![
        ColumnSpec::plain("Axis"),
        ColumnSpec::plain("List"),
        ColumnSpec::plain("Code"),
        ColumnSpec::rich("Label"),
    ])
}

/// Study question line subset summary: the effective entries.
pub fn line_summary_layout() -> ColumnLayout {
    ColumnLayout::new(vec![
        ColumnSpec::plain("Axis"),
        ColumnSpec::plain("Code"),
        ColumnSpec::rich("Label"),
    ])
}

/// One table per subset definition in a study's listing.
pub fn subset_listing_layout() -> ColumnLayout {
    ColumnLayout::new(vec![ColumnSpec::plain("Code"), ColumnSpec::rich("Label")])
}

fn axis_group(placement: Placement) -> i64 {
    match placement {
        Placement::Row => 0,
        Placement::Column => 1,
    }
}

fn answer_row(answer: &Answer, cells: Vec<String>) -> SummaryRow {
    SummaryRow::new(
        Section::DiscreteAnswer,
        OrderKey::grouped(
            axis_group(answer.placement),
            i64::from(answer.sort_order),
            answer.code.clone(),
        ),
        cells,
    )
}

// ============================================================================
// BUILDER
// ============================================================================

#[derive(Clone, Copy)]
pub struct SummaryBuilder<'a> {
    reader: AssociationReader<'a>,
    separator: &'a str,
}

impl<'a> SummaryBuilder<'a> {
    pub fn new(reader: AssociationReader<'a>, separator: &'a str) -> Self {
        Self { reader, separator }
    }

    /// Subset-independent answer summary of a question line: active list
    /// attachments expanded to their active entries, then discrete answers.
    pub fn question_line_summary(&self, question_line: &QuestionLine) -> RubricResult<String> {
        let mut attachments = self.reader.question_line_lists(question_line.question_line_id)?;
        attachments.sort_by_key(|a| (a.sort_order, a.question_line_reference_list_id));

        let mut rows = Vec::new();
        for (position, attachment) in attachments.iter().enumerate() {
            let Some(list) = self.reader.reference_list(attachment.reference_list_id)? else {
                continue;
            };
            if !list.state.is_active() {
                continue;
            }
            for entry in self.reader.list_entries(list.reference_list_id)? {
                rows.push(SummaryRow::new(
                    Section::ListBacked,
                    OrderKey::grouped(position as i64, i64::from(entry.sort_order), entry.code.clone()),
                    vec![
                        attachment.placement.to_string(),
                        list.name.clone(),
                        entry.code,
                        entry.label,
                    ],
                ));
            }
        }
        rows.extend(
            self.reader
                .answers(question_line.question_line_id)?
                .iter()
                .map(|a| {
                    answer_row(
                        a,
                        vec![
                            a.placement.to_string(),
                            String::new(),
                            a.code.clone(),
                            a.label.clone(),
                        ],
                    )
                }),
        );

        Ok(render_table(&rows, &answer_summary_layout())?)
    }

    /// Subset summary of a study question line: its effective entries, then
    /// the question line's discrete answers.
    pub fn line_summary(&self, line: &StudyQuestionLine) -> RubricResult<String> {
        let resolved =
            SubsetResolver::new(self.reader).resolve(line.study_id, line.study_question_line_id)?;

        let mut rows: Vec<SummaryRow> = resolved
            .iter()
            .map(|item| {
                SummaryRow::new(
                    Section::ListBacked,
                    OrderKey::grouped(
                        axis_group(item.placement()),
                        i64::from(item.entry.sort_order),
                        item.entry.code.clone(),
                    ),
                    vec![
                        item.placement().to_string(),
                        item.entry.code.clone(),
                        item.entry.label.clone(),
                    ],
                )
            })
            .collect();
        rows.extend(self.line_answers(line.question_line_id)?);

        Ok(render_table(&rows, &line_summary_layout())?)
    }

    fn line_answers(&self, question_line_id: QuestionLineId) -> RubricResult<Vec<SummaryRow>> {
        Ok(self
            .reader
            .answers(question_line_id)?
            .iter()
            .map(|a| {
                answer_row(
                    a,
                    vec![a.placement.to_string(), a.code.clone(), a.label.clone()],
                )
            })
            .collect())
    }

    /// Study subset listing: one titled table per subset definition attached
    /// to the study and selected by at least one active line subset there.
    /// Empty string when none are in effect.
    pub fn study_summary(&self, study: &Study) -> RubricResult<String> {
        let attached: BTreeSet<SubsetDefinitionId> = self
            .reader
            .study_subset_definitions(study.study_id)?
            .into_iter()
            .map(|s| s.subset_definition_id)
            .collect();

        let mut tables = Vec::new();
        for definition_id in attached {
            let Some(definition) = self.reader.subset_definition(definition_id)? else {
                continue;
            };
            if !definition.state.is_active() {
                continue;
            }
            if !self.in_effect(study, definition_id)? {
                tracing::trace!(
                    study = %study.study_id,
                    definition = %definition_id,
                    "subset definition not in effect"
                );
                continue;
            }

            let mut rows = Vec::new();
            for member in self.reader.subset_members(definition_id)? {
                let Some(entry) = self.reader.reference_list_entry(member.reference_list_entry_id)?
                else {
                    continue;
                };
                if !entry.state.is_active() {
                    continue;
                }
                rows.push(SummaryRow::new(
                    Section::ListBacked,
                    OrderKey::new(i64::from(entry.sort_order), entry.code.clone()),
                    vec![entry.code, entry.label],
                ));
            }
            let body = render_table(&rows, &subset_listing_layout())?;
            tables.push(((definition.name.clone(), definition_id), RenderedSection {
                title: Some(definition.name),
                body,
            }));
        }

        tables.sort_by(|a, b| a.0.cmp(&b.0));
        let sections: Vec<RenderedSection> = tables.into_iter().map(|(_, s)| s).collect();
        Ok(render_sections(&sections, self.separator))
    }

    /// A definition is in effect for a study while some active line of the
    /// study selects it.
    fn in_effect(&self, study: &Study, definition_id: SubsetDefinitionId) -> RubricResult<bool> {
        for selecting in self
            .reader
            .study_subsets_selecting(study.study_id, definition_id)?
        {
            let line = self
                .reader
                .study_question_line(selecting.study_question_line_id)?;
            if line.is_some_and(|l| l.state.is_active()) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

// ============================================================================
// TESTS
// ============================================================================
