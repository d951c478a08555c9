//! Clustering aggregator
//!
//! Groups cluster-eligible rows by the parent cell of their pre-computed H3
//! bucket and keeps the first-seen value of every output column, so each
//! bucket becomes one representative point.

use crate::catalog::Attribute;
use crate::config::StorageLayout;
use crate::sql::{Expr, Projection, Select, TableRef};

use super::plan::GEOMETRY_ALIAS;

pub struct ClusterAggregator<'a> {
    layout: &'a StorageLayout,
}

impl<'a> ClusterAggregator<'a> {
    pub fn new(layout: &'a StorageLayout) -> Self {
        Self { layout }
    }

    /// `(array_agg(<column>))[1]`
    fn first(column: &str) -> Expr {
        Expr::func("array_agg", vec![Expr::col(column)]).subscript(1)
    }

    /// Builds the grouped sub-select.
    ///
    /// `encode` turns the representative geometry into its tile-encoded form.
    pub fn build(
        &self,
        table: TableRef,
        predicate: Expr,
        attributes: &[&Attribute],
        resolution: u8,
        limit: i64,
        encode: impl FnOnce(Expr) -> Expr,
    ) -> Select {
        let layout = self.layout;

        let mut projection: Vec<Projection> = attributes
            .iter()
            .map(|a| Projection::aliased(Self::first(&a.column), a.name.as_str()))
            .collect();
        projection.push(Projection::aliased(
            Self::first(&layout.id_column),
            layout.id_column.as_str(),
        ));
        projection.push(Projection::aliased(
            Self::first(&layout.shard_key_column),
            layout.shard_key_column.as_str(),
        ));
        projection.push(Projection::aliased(
            encode(Self::first(&layout.geometry_column)),
            GEOMETRY_ALIAS,
        ));

        let eligible = Expr::col(layout.cluster_flag_column.as_str()).eq(Expr::Bool(true));
        let bucket = Expr::func(
            "h3_cell_to_parent",
            vec![
                Expr::col(layout.cluster_bucket_column.as_str()),
                Expr::Int(i64::from(resolution)),
            ],
        );

        Select::from_table(table)
            .with_projection(projection)
            .filter(Expr::And(vec![predicate, eligible]))
            .group_by(bucket)
            .limit(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AttributeType;
    use crate::sql::Statement;

    #[test]
    fn test_one_row_per_bucket() {
        let layout = StorageLayout::default();
        let name = Attribute {
            column: "text_attr1".into(),
            name: "name".into(),
            kind: AttributeType::Text,
        };

        let select = ClusterAggregator::new(&layout).build(
            TableRef::new("user_data", "point_x"),
            Expr::Bool(true),
            &[&name],
            5,
            1000,
            |geom| Expr::func("ST_AsMVTGeom", vec![geom]),
        );

        assert_eq!(
            Statement::select(&select).sql,
            "SELECT (array_agg(\"text_attr1\"))[1] AS \"name\", (array_agg(\"id\"))[1] AS \"id\", \
             (array_agg(\"h3_3\"))[1] AS \"h3_3\", ST_AsMVTGeom((array_agg(\"geom\"))[1]) AS \"geom\" \
             FROM \"user_data\".\"point_x\" WHERE (TRUE AND (\"cluster_keep\" = TRUE)) \
             GROUP BY h3_cell_to_parent(\"h3_group\", 5) LIMIT 1000"
        );
    }
}
