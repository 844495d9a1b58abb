//! Second traversal: primitives and attribute rows.

use log::{info, warn};

use super::schema::TablePlan;
use super::{ImportError, RunContext, Traversal};
use crate::geometry::{DecomposeRules, write_geometry};
use crate::{AttributeStore, CategoryPair, FeatureSource, FeatureStream, TopologyEngine};

pub(crate) fn run<S, T, A>(
    traversal: &Traversal<'_>,
    stream: &mut FeatureStream<S>,
    topology: &mut T,
    store: &mut A,
    tables: Option<&[TablePlan]>,
    ctx: &mut RunContext,
) -> Result<(), ImportError>
where
    S: FeatureSource,
    T: TopologyEngine + ?Sized,
    A: AttributeStore + ?Sized,
{
    let options = traversal.options;
    let rules = DecomposeRules {
        min_area: options.min_area,
        split_distance: ctx.split_distance,
        types: options.types,
        clean: !options.no_clean,
    };
    stream.reset();
    for plan in traversal.plans {
        let table = tables.and_then(|tables| tables.get(plan.position));
        if let Some(table) = table {
            store.begin(&table.schema.name)?;
        }
        let expected = ctx.layers.get(plan.position).map_or(0, |layer| layer.features);
        info!("Importing {expected} features (layer <{}>)...", plan.name);

        let mut ordinal = 0_i64;
        let mut skipped = 0_usize;
        while let Some(feature) = traversal.next(stream, plan)? {
            ordinal += 1;
            let cat = plan.category(&feature, ordinal)?;
            let pair = CategoryPair::new(plan.field, cat);
            let mut has_geometry = false;
            for geometry in plan.geometries(&feature).flatten() {
                has_geometry = true;
                write_geometry(topology, &geometry.geometry, Some(pair), &rules);
            }
            if !has_geometry {
                skipped += 1;
            }
            if let Some(table) = table {
                store.insert_row(&table.schema.name, cat, &table.row(&feature.values))?;
            }
        }

        if let Some(table) = table {
            store.commit(&table.schema.name)?;
        }
        if skipped > 0 {
            let noun = if skipped == 1 { "feature" } else { "features" };
            warn!(
                "{skipped} {noun} without geometry in layer <{}> skipped",
                plan.name
            );
        }
        if let Some(layer) = ctx.layers.get_mut(plan.position) {
            layer.skipped = skipped;
        }
    }

    for table in tables.unwrap_or_default() {
        store.create_category_index(&table.schema.name, &table.schema.key_column)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryAttributeStore, MemorySource, ScriptedTopology};
    use crate::{
        FieldDefn, FieldType, FieldValue, ImportOptions, ImportOutcome, PrimitiveKind,
        run_import,
    };
    use geo::{Point, polygon};
    use rstest::rstest;

    fn import(
        source: MemorySource,
        options: &ImportOptions,
    ) -> (Result<ImportOutcome, ImportError>, ScriptedTopology, MemoryAttributeStore) {
        let mut topology = ScriptedTopology::default();
        let mut store = MemoryAttributeStore::default();
        let result = run_import(source, &mut topology, &mut store, options);
        (result, topology, store)
    }

    #[rstest]
    fn sequential_categories_cover_every_feature() {
        let source = MemorySource::builder()
            .layer("poi")
            .geometry(10, Point::new(0.0, 0.0))
            .feature(11)
            .geometry(12, Point::new(1.0, 1.0))
            .build();
        let (result, topology, store) = import(source, &ImportOptions::new("poi"));
        let ImportOutcome::Imported(report) = result.expect("import") else {
            panic!("expected import");
        };
        assert_eq!(store.categories("poi"), vec![1, 2, 3]);
        assert!(store.is_indexed("poi"));
        assert_eq!(store.commits("poi"), 1);
        assert_eq!(topology.primitive_count(PrimitiveKind::Point), 2);
        assert_eq!(report.layers[0].skipped, 1);
    }

    #[rstest]
    fn duplicate_key_values_abort_at_index_creation() {
        let source = MemorySource::builder()
            .layer("poi")
            .field(FieldDefn::new("id", FieldType::Integer))
            .record(1, vec![FieldValue::Integer(5)], Some(Point::new(0.0, 0.0).into()))
            .record(2, vec![FieldValue::Integer(5)], Some(Point::new(1.0, 0.0).into()))
            .build();
        let mut options = ImportOptions::new("poi");
        options.key_column = Some("id".into());
        let (result, _, _) = import(source, &options);
        assert!(matches!(result, Err(ImportError::Store(_))));
    }

    #[rstest]
    fn non_positive_key_is_fatal() {
        let source = MemorySource::builder()
            .layer("poi")
            .field(FieldDefn::new("id", FieldType::Integer))
            .record(1, vec![FieldValue::Integer(0)], None)
            .build();
        let mut options = ImportOptions::new("poi");
        options.key_column = Some("id".into());
        let (result, _, _) = import(source, &options);
        assert!(matches!(
            result,
            Err(ImportError::Config(crate::ConfigError::InvalidCategory { .. }))
        ));
    }

    #[rstest]
    fn no_table_skips_the_store() {
        let square = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
        let source = MemorySource::builder().layer("a").geometry(1, square).build();
        let mut options = ImportOptions::new("a");
        options.no_table = true;
        options.no_clean = true;
        let (result, topology, store) = import(source, &options);
        assert!(result.is_ok());
        assert_eq!(store.table_names().count(), 0);
        assert_eq!(topology.primitive_count(PrimitiveKind::Centroid), 1);
    }
}
