use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::model::{TaskProfileFilter, TaskRow};
use crate::query::filter::{BoqFilter, TaskFilter, TaskOrder, UserFilter};
use crate::source::RecordSource;

use super::types::{BoqSummary, FilterOption, FilterOptions, SalesTasks};

/// Task list for the selected profiles with open BOQs per company, resolved
/// salesperson names and the distinct values available for filtering.
pub fn sales_tasks<S: RecordSource>(source: &S, profile: TaskProfileFilter) -> Result<SalesTasks> {
    let tasks = source.tasks(
        &TaskFilter::new()
            .profiles(profile.profiles())
            .order(TaskOrder::StartDateDesc),
    )?;

    let mut boq_data: BTreeMap<String, Vec<BoqSummary>> = BTreeMap::new();
    for boq in source.boqs(&BoqFilter::new().active())? {
        let Some(company) = boq.company else { continue };
        boq_data.entry(company).or_default().push(BoqSummary {
            name: boq.name,
            boq_status: boq.boq_status,
        });
    }

    let emails: BTreeSet<String> = tasks
        .iter()
        .filter_map(|t| t.task.assigned_sales.clone())
        .filter(|e| !e.is_empty())
        .collect();
    let salesperson_map: BTreeMap<String, String> = if emails.is_empty() {
        BTreeMap::new()
    } else {
        source
            .users(&UserFilter::new().emails(emails.into_iter().collect()))?
            .into_iter()
            .map(|u| (u.email, u.full_name))
            .collect()
    };

    let filter_options = filter_options(&tasks, &salesperson_map);
    Ok(SalesTasks {
        tasks,
        boq_data,
        filter_options,
        salesperson_map,
    })
}

fn filter_options(tasks: &[TaskRow], salespeople: &BTreeMap<String, String>) -> FilterOptions {
    let mut companies: BTreeMap<String, String> = BTreeMap::new();
    let mut statuses = BTreeSet::new();
    let mut types = BTreeSet::new();
    let mut profiles = BTreeSet::new();
    for row in tasks {
        let task = &row.task;
        if let Some(id) = task.company.as_deref().filter(|c| !c.is_empty()) {
            let label = row
                .company_name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| id.to_string());
            companies.insert(id.to_string(), label);
        }
        statuses.insert(task.status.to_string());
        types.insert(task.task_type.to_string());
        if let Some(ref p) = task.task_profile {
            profiles.insert(p.to_string());
        }
    }

    let plain = |values: BTreeSet<String>| -> Vec<FilterOption> {
        values
            .into_iter()
            .filter(|v| !v.is_empty())
            .map(|v| FilterOption {
                label: v.clone(),
                value: v,
                id: None,
            })
            .collect()
    };
    let labelled = |entries: &BTreeMap<String, String>| -> Vec<FilterOption> {
        let mut options: Vec<FilterOption> = entries
            .iter()
            .map(|(id, label)| FilterOption {
                value: id.clone(),
                label: label.clone(),
                id: Some(id.clone()),
            })
            .collect();
        options.sort_by(|a, b| a.label.cmp(&b.label));
        options
    };

    FilterOptions {
        companies: labelled(&companies),
        statuses: plain(statuses),
        types: plain(types),
        profiles: plain(profiles),
        salespersons: labelled(salespeople),
    }
}
