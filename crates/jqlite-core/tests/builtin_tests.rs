//! Builtin library tests.
//!
//! Every builtin gets at least one passing case and, where its inputs are
//! typed, one case showing the error it raises on the wrong type.
use jqlite_core::{compile, Value};

fn run(filter: &str, input: &str) -> Vec<String> {
    let program = compile(filter).unwrap_or_else(|e| panic!("compile {filter}: {e}"));
    let input = Value::from_json(input).expect("test input must be JSON");
    program
        .run_collect(input)
        .unwrap_or_else(|e| panic!("run {filter}: {e}"))
        .iter()
        .map(Value::to_string)
        .collect()
}

fn assert_outputs(filter: &str, input: &str, expected: &[&str]) {
    assert_eq!(run(filter, input), expected, "filter: {filter}\ninput:  {input}");
}

/// Assert the first error raised contains `fragment`.
fn assert_error(filter: &str, input: &str, fragment: &str) {
    let program = compile(filter).unwrap_or_else(|e| panic!("compile {filter}: {e}"));
    let input = Value::from_json(input).expect("test input must be JSON");
    match program.run_collect(input) {
        Ok(outputs) => panic!("expected {filter} to fail, got {outputs:?}"),
        Err(e) => assert!(
            e.to_string().contains(fragment),
            "filter {filter}: error {:?} does not mention {:?}",
            e.to_string(),
            fragment
        ),
    }
}

// ============================================================================
// Introspection
// ============================================================================

mod introspection {
    use super::*;

    #[test]
    fn type_names() {
        assert_outputs(
            "map(type)",
            r#"[null,true,1,"a",[],{}]"#,
            &[r#"["null","boolean","number","string","array","object"]"#],
        );
    }

    #[test]
    fn length() {
        assert_outputs("map(length)", r#"[[1,2],"ab",{"a":1},null,-3]"#, &["[2,2,1,0,3]"]);
        assert_outputs("length", r#""héllo""#, &["5"]);
        assert_error("length", "true", "boolean (true) has no length");
    }

    #[test]
    fn utf8bytelength() {
        assert_outputs("utf8bytelength", r#""é""#, &["2"]);
        assert_error("utf8bytelength", "[]", "only strings have UTF-8 byte length");
    }

    #[test]
    fn keys() {
        assert_outputs("keys", r#"{"b":1,"a":2}"#, &[r#"["a","b"]"#]);
        assert_outputs("keys_unsorted", r#"{"b":1,"a":2}"#, &[r#"["a","b"]"#]);
        assert_outputs("keys", "[5,6]", &["[0,1]"]);
        assert_error("keys", "1", "number (1) has no keys");
        assert_error("keys_unsorted", "null", "null (null) has no keys");
    }

    #[test]
    fn has_and_in() {
        assert_outputs(r#"has("a"), has("z")"#, r#"{"a":1}"#, &["true", "false"]);
        assert_outputs("has(0), has(1)", "[1]", &["true", "false"]);
        assert_outputs(r#""a" | in({"a":1})"#, "null", &["true"]);
        assert_error("has(0)", "{}", "Cannot check whether object has a number key");
        assert_error("in([])", r#""a""#, "Cannot check whether array has a string key");
    }

    #[test]
    fn contains_and_inside() {
        assert_outputs(r#"contains("bar")"#, r#""foobar""#, &["true"]);
        assert_outputs("contains([1])", "[1,2]", &["true"]);
        assert_outputs(r#"contains({a:[1]})"#, r#"{"a":[1,2],"b":1}"#, &["true"]);
        assert_outputs(r#"contains({c:1})"#, r#"{"a":1}"#, &["false"]);
        assert_outputs(r#"inside("foobar")"#, r#""bar""#, &["true"]);
        assert_error("contains(1)", r#""a""#, "cannot have their containment checked");
        assert_error(r#"inside("a")"#, "1", "cannot have their containment checked");
    }

    #[test]
    fn empty_not_select() {
        assert_outputs("[empty]", "null", &["[]"]);
        assert_outputs("[.[] | not]", "[null,false,0]", &["[true,true,false]"]);
        assert_outputs("[.[] | select(. > 1)]", "[1,2,3]", &["[2,3]"]);
        assert_error("select(.a)", "1", "Cannot index number");
    }

    #[test]
    fn error_builtins() {
        assert_outputs(r#"try error catch ."#, r#""msg""#, &[r#""msg""#]);
        assert_outputs(r#"try error("x") catch ."#, "null", &[r#""x""#]);
        assert_error(r#"error("boom")"#, "null", "boom");
    }

    #[test]
    fn isempty() {
        assert_outputs("isempty(empty), isempty(1, 2)", "null", &["true", "false"]);
        assert_error(r#"isempty(error("x"))"#, "null", "x");
    }
}

// ============================================================================
// Collections
// ============================================================================

mod collections {
    use super::*;

    #[test]
    fn add() {
        assert_outputs("add", "[1,2,3]", &["6"]);
        assert_outputs("add", r#"["a","b"]"#, &[r#""ab""#]);
        assert_outputs("add", "[]", &["null"]);
        assert_outputs("add", r#"{"a":[1],"b":[2]}"#, &["[1,2]"]);
        assert_error("add", r#"[1,"a"]"#, "cannot be added");
        assert_error("add", "1", "Cannot iterate over number (1)");
    }

    #[test]
    fn sort_and_unique() {
        assert_outputs("sort", "[3,1,2]", &["[1,2,3]"]);
        assert_outputs("unique", "[1,2,1]", &["[1,2]"]);
        assert_error("sort", r#""a""#, r#"string ("a") cannot be sorted, as it is not an array"#);
        assert_error("unique", "{}", "cannot be sorted, as it is not an array");
    }

    #[test]
    fn keyed_sorting_is_stable() {
        assert_outputs(
            "sort_by(.a) | map(.b)",
            r#"[{"a":2,"b":1},{"a":1,"b":2},{"a":2,"b":3}]"#,
            &["[2,1,3]"],
        );
        assert_outputs("unique_by(length)", r#"["a","bb","c"]"#, &[r#"["a","bb"]"#]);
        assert_outputs("sort_by(.a, .b) | map(.b)", r#"[{"a":1,"b":2},{"a":1,"b":1}]"#, &["[1,2]"]);
        assert_error("sort_by(.a)", r#""x""#, "cannot be sorted");
        assert_error("unique_by(.a)", "1", "cannot be sorted");
    }

    #[test]
    fn group_by() {
        assert_outputs("group_by(. % 2)", "[1,2,3,4]", &["[[2,4],[1,3]]"]);
        assert_error("group_by(.)", "1", "cannot be sorted");
    }

    #[test]
    fn reverse() {
        assert_outputs("reverse", "[1,2]", &["[2,1]"]);
        assert_outputs("reverse", r#""abc""#, &[r#""cba""#]);
        assert_outputs("reverse", "null", &["[]"]);
        assert_error("reverse", "1", "number (1) cannot be reversed, as it is not an array");
    }

    #[test]
    fn min_and_max() {
        assert_outputs("min, max", "[3,1,2]", &["1", "3"]);
        assert_outputs("min, max", "[]", &["null", "null"]);
        assert_outputs(
            "min_by(.a), max_by(.a)",
            r#"[{"a":2},{"a":1},{"a":3}]"#,
            &[r#"{"a":1}"#, r#"{"a":3}"#],
        );
        assert_outputs(
            "max_by(.a) | .b",
            r#"[{"a":1,"b":"first"},{"a":1,"b":"second"}]"#,
            &[r#""second""#],
        );
        assert_error("min", r#""a""#, "cannot be iterated over, as it is not an array");
        assert_error("max_by(.)", "{}", "cannot be iterated over, as it is not an array");
    }

    #[test]
    fn first_last_nth() {
        assert_outputs("first, last", "[1,2,3]", &["1", "3"]);
        assert_outputs("first", "[]", &["null"]);
        assert_outputs("first(range(5; 10)), last(range(5))", "null", &["5", "4"]);
        assert_outputs("[last(empty)]", "null", &["[]"]);
        assert_outputs("nth(1)", "[1,2]", &["2"]);
        assert_outputs("nth(2; range(10))", "null", &["2"]);
        assert_outputs("[nth(5; 1, 2)]", "null", &["[]"]);
        assert_error("first", "1", "Cannot index number with number");
        assert_error("nth(-1; 1)", "null", "Out of bounds negative array index");
    }

    #[test]
    fn flatten() {
        assert_outputs("flatten", "[1,[2,[3]]]", &["[1,2,3]"]);
        assert_outputs("flatten(1)", "[1,[2,[3]]]", &["[1,2,[3]]"]);
        assert_error("flatten(-1)", "[]", "flatten depth must not be negative");
        assert_error("flatten", "1", "Cannot iterate over number (1)");
    }

    #[test]
    fn range() {
        assert_outputs("[range(3)]", "null", &["[0,1,2]"]);
        assert_outputs("[range(1; 3)]", "null", &["[1,2]"]);
        assert_outputs("[range(0; 1; 0.25)]", "null", &["[0,0.25,0.5,0.75]"]);
        assert_outputs("[range(0, 1; 3, 4)]", "null", &["[0,1,2,0,1,2,3,1,2,1,2,3]"]);
        assert_error(r#"range("a")"#, "null", "Range bounds must be numeric");
    }

    #[test]
    fn limit() {
        assert_outputs("[limit(2; .[])]", "[1,2,3]", &["[1,2]"]);
        assert_outputs("[limit(-1; .[])]", "[1,2,3]", &["[]"]);
        assert_error(r#"limit("a"; 1)"#, "null", "Invalid limit");
    }

    #[test]
    fn until_while_repeat() {
        assert_outputs("until(. >= 3; . + 1)", "0", &["3"]);
        assert_outputs("[while(. < 3; . + 1)]", "0", &["[0,1,2]"]);
        assert_outputs("[limit(3; repeat(. * 2))]", "1", &["[1,2,4]"]);
        assert_error(r#"until(. > 3; . + "a")"#, "0", "cannot be added");
    }

    #[test]
    fn long_loops_run_to_completion() {
        assert_outputs("until(. >= 100000; . + 1)", "0", &["100000"]);
        assert_outputs("[while(. < 100000; . + 1)] | length", "0", &["100000"]);
        assert_outputs("[limit(100000; repeat(1))] | length", "null", &["100000"]);
        assert_outputs(
            "[recurse(if . < 100000 then . + 1 else empty end)] | length",
            "0",
            &["100001"],
        );
        assert_outputs(
            "[recurse(. + 1; . <= 100000)] | last",
            "0",
            &["100000"],
        );
    }

    #[test]
    fn loops_fan_out_depth_first() {
        assert_outputs("[until(. >= 4; . + 1, . + 2)]", "3", &["[3]"]);
        assert_outputs("[until(. >= 2; . + 1, . + 2)]", "0", &["[2,3,2]"]);
        assert_outputs("[limit(5; repeat(. + 1, . + 10))]", "0", &["[0,1,2,3,4]"]);
    }

    #[test]
    fn any_and_all() {
        assert_outputs("any, all", "[false, 1]", &["true", "false"]);
        assert_outputs("any, all", "[]", &["false", "true"]);
        assert_outputs("any(. > 2), all(. > 2)", "[1,3]", &["true", "false"]);
        assert_outputs("all(.[]; . > 0)", "[1,2]", &["true"]);
        assert_outputs(r#"any(1, error("x"); . == 1)"#, "null", &["true"]);
    }

    #[test]
    fn any_and_all_errors() {
        assert_error("any", "1", "Cannot iterate over number (1)");
        assert_error("all(. > 0)", "true", "Cannot iterate over boolean (true)");
    }

    #[test]
    fn transpose() {
        assert_outputs("transpose", "[[1,2],[3]]", &["[[1,3],[2,null]]"]);
        assert_error("transpose", "[1]", "Cannot transpose number (1)");
    }

    #[test]
    fn indices_index_rindex() {
        assert_outputs(r#"indices(", ")"#, r#""a,b, cd, efg""#, &["[3,7]"]);
        assert_outputs("indices(1)", "[0,1,2,1,3]", &["[1,3]"]);
        assert_outputs("indices([1,2])", "[0,1,2,1,2]", &["[1,3]"]);
        assert_outputs(r#"index(", "), rindex(", ")"#, r#""a,b, cd, efg""#, &["3", "7"]);
        assert_outputs(r#"index("z")"#, r#""abc""#, &["null"]);
        assert_error("indices(1)", "1", "Cannot determine indices");
        assert_error(r#"index("a")"#, "{}", "Cannot determine indices");
    }
}

// ============================================================================
// Objects and paths
// ============================================================================

mod objects {
    use super::*;

    #[test]
    fn to_entries_and_from_entries() {
        assert_outputs("to_entries", r#"{"a":1}"#, &[r#"[{"key":"a","value":1}]"#]);
        assert_outputs(
            "from_entries",
            r#"[{"key":"a","value":1},{"k":"b","v":2},{"name":"c","value":3}]"#,
            &[r#"{"a":1,"b":2,"c":3}"#],
        );
        assert_outputs("from_entries", r#"[{"key":1,"value":true}]"#, &[r#"{"1":true}"#]);
        assert_error("to_entries", "1", "has no keys");
        assert_error("from_entries", "[1]", "Cannot use number (1) as object entry");
    }

    #[test]
    fn with_entries() {
        assert_outputs("with_entries(.value += 1)", r#"{"a":1}"#, &[r#"{"a":2}"#]);
        assert_outputs(
            r#"with_entries(select(.key != "b"))"#,
            r#"{"a":1,"b":2}"#,
            &[r#"{"a":1}"#],
        );
        assert_error("with_entries(.)", r#""x""#, "has no keys");
    }

    #[test]
    fn map_and_map_values() {
        assert_outputs("map(. + 1)", "[1,2]", &["[2,3]"]);
        assert_outputs("map(. + 1)", r#"{"a":1,"b":2}"#, &["[2,3]"]);
        assert_outputs("map(.[])", "[[1,2],[3]]", &["[1,2,3]"]);
        assert_outputs("map_values(. * 2)", r#"{"a":1}"#, &[r#"{"a":2}"#]);
        assert_outputs("map_values(empty)", "[1,2]", &["[]"]);
        assert_outputs("map_values(., 10)", "[1]", &["[1]"]);
        assert_error("map(.)", "1", "Cannot iterate over number (1)");
        assert_error("map_values(.)", "true", "Cannot iterate over boolean (true)");
    }

    #[test]
    fn path_builtins() {
        assert_outputs("getpath([\"a\",0])", r#"{"a":[5]}"#, &["5"]);
        assert_outputs("getpath([\"x\",\"y\"])", "{}", &["null"]);
        assert_outputs("setpath([\"a\",1]; 5)", "null", &[r#"{"a":[null,5]}"#]);
        assert_outputs(
            r#"delpaths([["a"],["b",0]])"#,
            r#"{"a":1,"b":[1,2]}"#,
            &[r#"{"b":[2]}"#],
        );
        assert_error(r#"getpath("a")"#, "{}", "Path must be specified as an array");
        assert_error("setpath(1; 2)", "{}", "Path must be specified as an array");
        assert_error("delpaths(1)", "{}", "Paths must be specified as an array, got number");
    }

    #[test]
    fn path_and_del() {
        assert_outputs("[path(.a, .b[1])]", "null", &[r#"[["a"],["b",1]]"#]);
        assert_outputs("del(.a)", r#"{"a":1,"b":2}"#, &[r#"{"b":2}"#]);
        assert_outputs("del(.[0])", "[1,2]", &["[2]"]);
        assert_error("del(.a)", "[1]", "Cannot index array");
        assert_error("path(1)", "null", "Invalid path expression");
    }

    #[test]
    fn paths_and_leaf_paths() {
        assert_outputs("[paths]", "[[1]]", &["[[0],[0,0]]"]);
        assert_outputs("[paths(type == \"array\")]", "[[1]]", &["[[0]]"]);
        assert_outputs("[leaf_paths]", r#"{"a":{"b":null}}"#, &[r#"[["a","b"]]"#]);
        assert_outputs("[paths]", "1", &["[]"]);
    }
}

// ============================================================================
// Strings
// ============================================================================

mod strings {
    use super::*;

    #[test]
    fn conversions() {
        assert_outputs("map(tostring)", r#"[1,"a",[1]]"#, &[r#"["1","a","[1]"]"#]);
        assert_outputs("tojson", r#"[1,"a"]"#, &[r#""[1,\"a\"]""#]);
        assert_outputs("fromjson", r#""{\"a\":1}""#, &[r#"{"a":1}"#]);
        assert_outputs("tonumber", r#""1.5""#, &["1.5"]);
        assert_outputs("tonumber", "7", &["7"]);
    }

    #[test]
    fn conversion_errors() {
        assert_error("fromjson", "1", "number (1) only strings can be parsed");
        assert_error("fromjson", r#""{""#, "while parsing");
        assert_error("tonumber", r#""abc""#, "Cannot parse 'abc' as JSON");
        assert_error("tonumber", "[]", "array ([]) cannot be parsed as a number");
    }

    #[test]
    fn case_and_trimming() {
        assert_outputs("ascii_downcase, ascii_upcase", r#""aBc""#, &[r#""abc""#, r#""ABC""#]);
        assert_outputs("trim, ltrim, rtrim", r#""  a  ""#, &[r#""a""#, r#""a  ""#, r#""  a""#]);
        assert_error("ascii_downcase", "1", "ascii_downcase input must be a string, got number (1)");
        assert_error("ascii_upcase", "[]", "ascii_upcase input must be a string");
        assert_error("trim", "1", "trim input must be a string");
        assert_error("ltrim", "null", "trim input must be a string");
        assert_error("rtrim", "{}", "trim input must be a string");
    }

    #[test]
    fn explode_and_implode() {
        assert_outputs("explode", r#""aé""#, &["[97,233]"]);
        assert_outputs("implode", "[97,233]", &[r#""aé""#]);
        assert_error("explode", "1", "explode input must be a string");
        assert_error("implode", r#""a""#, "implode input must be an array");
        assert_error("implode", "[-1]", "Invalid codepoint literal");
    }

    #[test]
    fn ascii() {
        assert_outputs("ascii", "65", &[r#""A""#]);
        assert_outputs("ascii(66)", "null", &[r#""B""#]);
        assert_error("ascii", "200", "ascii requires a code point between 0 and 127");
    }

    #[test]
    fn split_and_join() {
        assert_outputs(r#"split(", ")"#, r#""a, b""#, &[r#"["a","b"]"#]);
        assert_outputs(r#"split(",")"#, r#""""#, &["[]"]);
        assert_outputs(r#"join("-")"#, r#"["a",1,null,true]"#, &[r#""a-1--true""#]);
        assert_error(r#"split(",")"#, "1", "split input and separator must be strings");
        assert_error(r#"join(",")"#, "[[1]]", "Cannot join with array");
        assert_error("join(1)", r#"["a"]"#, "join separator must be a string");
    }

    #[test]
    fn affixes() {
        assert_outputs(r#"startswith("fo"), endswith("ar")"#, r#""foobar""#, &["true", "true"]);
        assert_outputs(r#"ltrimstr("foo"), rtrimstr("bar")"#, r#""foobar""#, &[r#""bar""#, r#""foo""#]);
        assert_outputs(r#"ltrimstr("x")"#, "1", &["1"]);
        assert_error(r#"startswith("a")"#, "1", "startswith() requires string inputs");
        assert_error("endswith(1)", r#""a""#, "endswith() requires string inputs");
    }

    #[test]
    fn formats() {
        assert_outputs(r#"format("csv")"#, r#"[1,"a"]"#, &[r#""1,\"a\"""#]);
        assert_outputs("@text", "[1]", &[r#""[1]""#]);
        assert_outputs("@html", r#""<&>""#, &[r#""&lt;&amp;&gt;""#]);
        assert_outputs("@uri", r#""a b""#, &[r#""a%20b""#]);
        assert_outputs("@sh", r#""it's""#, &[r#""'it'\\''s'""#]);
        assert_outputs("@tsv", r#"["a","b"]"#, &[r#""a\tb""#]);
        assert_outputs("@base64d", r#""aGk=""#, &[r#""hi""#]);
        assert_outputs("@base32 | @base32d", r#""hello""#, &[r#""hello""#]);
        assert_error(r#"format("nope")"#, "1", "nope is not a valid format");
        assert_error("format(1)", "1", "number (1) is not a valid format");
        assert_error("@csv", "{}", "cannot be csv-formatted, only an array can be");
    }
}

// ============================================================================
// Regular expressions
// ============================================================================

mod regex {
    use super::*;

    #[test]
    fn test_and_match() {
        assert_outputs(r#"test("b+")"#, r#""abbc""#, &["true"]);
        assert_outputs(r#"test("B"; "i")"#, r#""abc""#, &["true"]);
        assert_outputs(
            r#"[match("a(?<x>b)?") | .captures[0].string]"#,
            r#""ab""#,
            &[r#"["b"]"#],
        );
        assert_outputs(r#"[match("a"; "g") | .offset]"#, r#""aba""#, &["[0,2]"]);
        assert_error(r#"test("a")"#, "1", "number (1) cannot be matched, as it is not a string");
        assert_error(r#"match("(")"#, r#""a""#, "is not a valid regex");
    }

    #[test]
    fn capture_and_scan() {
        assert_outputs(
            r#"capture("(?<y>\\d+)-(?<m>\\d+)")"#,
            r#""2024-05""#,
            &[r#"{"m":"05","y":"2024"}"#],
        );
        assert_outputs(r#"[scan("\\d")]"#, r#""a1b2""#, &[r#"["1","2"]"#]);
        assert_error(r#"capture("a")"#, "[]", "cannot be matched, as it is not a string");
        assert_error(r#"scan("a")"#, "{}", "cannot be matched, as it is not a string");
    }

    #[test]
    fn split_and_splits() {
        assert_outputs(r#"split(", *"; null)"#, r#""a, b,c""#, &[r#"["a","b","c"]"#]);
        assert_outputs(r#"[splits(", *")]"#, r#""a, b,c""#, &[r#"["a","b","c"]"#]);
        assert_error(r#"[splits("a")]"#, "1", "cannot be matched");
    }

    #[test]
    fn sub_and_gsub() {
        assert_outputs(r#"sub("a"; "b")"#, r#""aaa""#, &[r#""baa""#]);
        assert_outputs(r#"gsub("a"; "b")"#, r#""aaa""#, &[r#""bbb""#]);
        assert_outputs(
            r#"gsub("(?<l>[a-z])"; "\(.l | ascii_upcase)")"#,
            r#""ab1""#,
            &[r#""AB1""#],
        );
        assert_outputs(r#"sub("A"; "x"; "gi")"#, r#""aA""#, &[r#""xx""#]);
        assert_outputs(r#"gsub("z"; "y")"#, r#""abc""#, &[r#""abc""#]);
        assert_error(r#"sub("a"; "b")"#, "1", "cannot be matched");
        assert_error(r#"gsub("a"; "b"; "q")"#, r#""a""#, "is not a valid modifier string");
    }
}

// ============================================================================
// Math
// ============================================================================

mod math {
    use super::*;

    #[test]
    fn rounding_and_roots() {
        assert_outputs("map(floor)", "[1.5,-1.5]", &["[1,-2]"]);
        assert_outputs("map(ceil)", "[1.2,-1.2]", &["[2,-1]"]);
        assert_outputs("map(round)", "[2.5,-2.5,2.4]", &["[3,-3,2]"]);
        assert_outputs("sqrt", "16", &["4"]);
        assert_outputs("fabs, abs", "-2", &["2", "2"]);
        assert_error("floor", r#""a""#, r#"string ("a") number required"#);
        assert_error("abs", "[]", "has no absolute value");
    }

    #[test]
    fn exponentials_and_logs() {
        assert_outputs("pow(2; 10)", "null", &["1024"]);
        assert_outputs("log, exp", "0", &["-1.7976931348623157e308", "1"]);
        assert_outputs("log10", "100", &["2"]);
        assert_outputs("log2", "8", &["3"]);
        assert_error(r#"pow("a"; 1)"#, "null", "number required");
        assert_error("log", "null", "null (null) number required");
    }

    #[test]
    fn special_values() {
        assert_outputs("[infinite, -infinite, nan]", "null", &["[1.7976931348623157e308,-1.7976931348623157e308,null]"]);
        assert_outputs("infinite | isinfinite", "null", &["true"]);
        assert_outputs("nan | isnan", "null", &["true"]);
        assert_outputs("1, 0 | isnormal", "null", &["true", "false"]);
        assert_error("isnan", r#""x""#, "number required");
    }
}

// ============================================================================
// Type selectors, recursion, environment
// ============================================================================

mod selectors {
    use super::*;

    const MIXED: &str = r#"[null,true,1,"a",[2],{"b":3}]"#;

    #[test]
    fn each_selector_keeps_its_type() {
        assert_outputs("[.[] | values]", MIXED, &[r#"[true,1,"a",[2],{"b":3}]"#]);
        assert_outputs("[.[] | nulls]", MIXED, &["[null]"]);
        assert_outputs("[.[] | booleans]", MIXED, &["[true]"]);
        assert_outputs("[.[] | numbers]", MIXED, &["[1]"]);
        assert_outputs("[.[] | strings]", MIXED, &[r#"["a"]"#]);
        assert_outputs("[.[] | arrays]", MIXED, &["[[2]]"]);
        assert_outputs("[.[] | objects]", MIXED, &[r#"[{"b":3}]"#]);
        assert_outputs("[.[] | iterables]", MIXED, &[r#"[[2],{"b":3}]"#]);
        assert_outputs("[.[] | scalars]", MIXED, &[r#"[null,true,1,"a"]"#]);
    }

    #[test]
    fn recurse_forms() {
        assert_outputs("[recurse]", "[[1]]", &["[[[1]],[1],1]"]);
        assert_outputs("[recurse(if . < 3 then . + 1 else empty end)]", "0", &["[0,1,2,3]"]);
        assert_outputs("[recurse(.[]?; . != 2)]", "[1,[2]]", &["[[1,[2]],1,[2]]"]);
        assert_error("[recurse(.a)]", r#"{"a":1}"#, "Cannot index number");
    }

    #[test]
    fn walk_rebuilds_bottom_up() {
        assert_outputs(
            r#"walk(if type == "number" then . + 1 else . end)"#,
            r#"[1,{"a":2}]"#,
            &[r#"[2,{"a":3}]"#],
        );
        assert_outputs("walk(if type == \"array\" then sort else . end)", "[[3,1],[2]]", &["[[1,3],[2]]"]);
        assert_error("walk(. + 1)", r#"["a"]"#, "cannot be added");
    }

    #[test]
    fn env_and_debugging_pass_through() {
        assert_outputs("env | type", "null", &[r#""object""#]);
        assert_outputs("debug", "[1]", &["[1]"]);
        assert_outputs(r#"debug("note")"#, "2", &["2"]);
        assert_outputs("stderr", r#""x""#, &[r#""x""#]);
        assert_error("debug(error)", "1", "1 (not a string)");
    }
}
