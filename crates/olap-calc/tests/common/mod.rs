#![allow(dead_code)]

use olap_calc::{
    BaseCompiler, ContextEvaluator, EvaluatorSettings, Exp, FunTable, InMemoryCells, Syntax,
};
use olap_model::{DimensionId, HierarchyId, LevelId, MemberId, Schema};
use std::sync::Arc;

/// A small sales cube.
///
/// ```text
/// Measures   Sales, Cost, Profit (calculated in some tests)
/// Time       All Times > 1997 > Q1, Q2
///                      > 1998 > Q1
/// Product    All Products > Drink, Food
/// Store      [Store] All Stores > USA, Canada
///            [Store Type] All Store Types > Supermarket
/// Warehouse  All Warehouses > W1
/// ```
pub struct Cube {
    pub schema: Arc<Schema>,
    pub cells: Arc<InMemoryCells>,

    pub measures: HierarchyId,
    pub sales: MemberId,
    pub cost: MemberId,
    pub profit: MemberId,

    pub time_dim: DimensionId,
    pub time: HierarchyId,
    pub year: LevelId,
    pub quarter: LevelId,
    pub y1997: MemberId,
    pub y1998: MemberId,
    pub q1_1997: MemberId,
    pub q2_1997: MemberId,
    pub q1_1998: MemberId,

    pub product_dim: DimensionId,
    pub product: HierarchyId,
    pub family: LevelId,
    pub drink: MemberId,
    pub food: MemberId,

    pub store_dim: DimensionId,
    pub store: HierarchyId,
    pub store_type: HierarchyId,
    pub usa: MemberId,
    pub canada: MemberId,

    pub warehouse_dim: DimensionId,
    pub warehouse: HierarchyId,
    pub w1: MemberId,
}

pub fn cube() -> Cube {
    let mut schema = Schema::new("Sales");

    let measures_level = schema.add_measures_dimension().unwrap();
    let sales = schema.add_member(measures_level, None, "Sales").unwrap();
    let cost = schema.add_member(measures_level, None, "Cost").unwrap();
    let profit = schema.add_member(measures_level, None, "Profit").unwrap();
    let measures = schema.level(measures_level).hierarchy();

    let time_dim = schema.add_dimension("Time").unwrap();
    let time = schema.add_hierarchy(time_dim, None, true).unwrap();
    let year = schema.add_level(time, "Year").unwrap();
    let quarter = schema.add_level(time, "Quarter").unwrap();
    let y1997 = schema.add_member(year, None, "1997").unwrap();
    let y1998 = schema.add_member(year, None, "1998").unwrap();
    let q1_1997 = schema.add_member(quarter, Some(y1997), "Q1").unwrap();
    let q2_1997 = schema.add_member(quarter, Some(y1997), "Q2").unwrap();
    let q1_1998 = schema.add_member(quarter, Some(y1998), "Q1").unwrap();

    let product_dim = schema.add_dimension("Product").unwrap();
    let product = schema.add_hierarchy(product_dim, None, true).unwrap();
    let family = schema.add_level(product, "Family").unwrap();
    let drink = schema.add_member(family, None, "Drink").unwrap();
    let food = schema.add_member(family, None, "Food").unwrap();

    let store_dim = schema.add_dimension("Store").unwrap();
    let store = schema.add_hierarchy(store_dim, None, true).unwrap();
    let country = schema.add_level(store, "Country").unwrap();
    let usa = schema.add_member(country, None, "USA").unwrap();
    let canada = schema.add_member(country, None, "Canada").unwrap();
    let store_type = schema
        .add_hierarchy(store_dim, Some("Store Type"), true)
        .unwrap();
    let type_level = schema.add_level(store_type, "Type").unwrap();
    schema.add_member(type_level, None, "Supermarket").unwrap();

    let warehouse_dim = schema.add_dimension("Warehouse").unwrap();
    let warehouse = schema.add_hierarchy(warehouse_dim, None, true).unwrap();
    let name = schema.add_level(warehouse, "Name").unwrap();
    let w1 = schema.add_member(name, None, "W1").unwrap();

    let mut cells = InMemoryCells::new();
    let rows: &[(&[MemberId], f64)] = &[
        (&[sales], 57.0),
        (&[cost], 34.0),
        (&[sales, y1997], 50.0),
        (&[cost, y1997], 30.0),
        (&[sales, y1998], 7.0),
        (&[cost, y1998], 4.0),
        (&[sales, q1_1997], 30.0),
        (&[sales, q2_1997], 20.0),
        (&[sales, q1_1998], 7.0),
        (&[sales, drink], 22.0),
        (&[sales, food], 35.0),
        (&[sales, y1997, drink], 15.0),
        (&[sales, y1997, food], 35.0),
        (&[sales, y1998, drink], 7.0),
        (&[sales, q1_1997, drink], 10.0),
        (&[sales, q1_1997, food], 20.0),
        (&[sales, q2_1997, drink], 5.0),
        (&[sales, q2_1997, food], 15.0),
        (&[sales, q1_1998, drink], 7.0),
        (&[sales, y1997, w1], 99.0),
    ];
    for (members, value) in rows {
        cells.insert(&schema, members, *value);
    }

    Cube {
        schema: Arc::new(schema),
        cells: Arc::new(cells),
        measures,
        sales,
        cost,
        profit,
        time_dim,
        time,
        year,
        quarter,
        y1997,
        y1998,
        q1_1997,
        q2_1997,
        q1_1998,
        product_dim,
        product,
        family,
        drink,
        food,
        store_dim,
        store,
        store_type,
        usa,
        canada,
        warehouse_dim,
        warehouse,
        w1,
    }
}

impl Cube {
    pub fn evaluator(&self) -> ContextEvaluator {
        self.evaluator_with(EvaluatorSettings::default())
    }

    pub fn evaluator_with(&self, settings: EvaluatorSettings) -> ContextEvaluator {
        ContextEvaluator::new(self.schema.clone(), self.cells.clone(), settings)
    }

    /// Evaluator for a cube that joins every dimension except Warehouse.
    pub fn sales_cube_evaluator(&self, settings: EvaluatorSettings) -> ContextEvaluator {
        self.evaluator_with(settings).with_related_dimensions([
            self.schema.member_dimension(self.sales),
            self.time_dim,
            self.product_dim,
            self.store_dim,
        ])
    }

    pub fn base_compiler(&self) -> BaseCompiler {
        BaseCompiler::new(self.schema.clone(), &self.evaluator())
    }

    pub fn member(&self, id: MemberId) -> Exp {
        Exp::member(&self.schema, id)
    }

    pub fn level(&self, id: LevelId) -> Exp {
        Exp::level(&self.schema, id)
    }

    pub fn hierarchy(&self, id: HierarchyId) -> Exp {
        Exp::hierarchy(&self.schema, id)
    }

    pub fn call(&self, name: &str, syntax: Syntax, args: Vec<Exp>) -> Exp {
        FunTable::standard()
            .call(&self.schema, name, syntax, args)
            .unwrap()
    }

    pub fn fun(&self, name: &str, args: Vec<Exp>) -> Exp {
        self.call(name, Syntax::Function, args)
    }

    pub fn property(&self, target: Exp, name: &str) -> Exp {
        self.call(name, Syntax::Property, vec![target])
    }

    pub fn infix(&self, left: Exp, op: &str, right: Exp) -> Exp {
        self.call(op, Syntax::Infix, vec![left, right])
    }

    /// `level.Members`
    pub fn members(&self, level: LevelId) -> Exp {
        self.property(self.level(level), "Members")
    }
}
