use mgraph_rs::error::Error;
use mgraph_rs::scope::Scope;
use mgraph_rs::tensor::{DType, Tensor};

#[test]
fn fed_tensor_aliases_caller_storage() {
    let mut scope = Scope::new();
    let input = Tensor::from_vec([2, 2], vec![1.0f32, 2.0, 3.0, 4.0]).unwrap();
    scope.share_tensor("x", &input).unwrap();

    input.fill(7.0);
    assert_eq!(scope.tensor("x").unwrap().to_vec::<f32>().unwrap(), vec![7.0; 4]);
    assert!(scope.tensor("x").unwrap().shares_storage_with(&input));
}

#[test]
fn reallocating_one_alias_detaches_it() {
    let mut scope = Scope::new();
    let input = Tensor::ones([4], DType::F32);
    scope.share_tensor("a", &input).unwrap();
    scope.share_tensor("b", &input).unwrap();

    // Same dtype and element count: the shared slot is reused.
    scope.tensor_mut("a").unwrap().mutable_data([2, 2], DType::F32);
    assert!(scope.tensor("a").unwrap().shares_storage_with(&input));

    // A different element count gives "a" a fresh slot; "b" keeps the old one.
    scope.tensor_mut("a").unwrap().mutable_data([8], DType::F32);
    let a = scope.tensor("a").unwrap().clone();
    let b = scope.tensor("b").unwrap().clone();
    assert!(!a.shares_storage_with(&b));
    assert!(b.shares_storage_with(&input));
    assert_eq!(b.to_vec::<f32>().unwrap(), vec![1.0; 4]);
}

#[test]
fn variable_payload_type_is_fixed_once_set() {
    let mut scope = Scope::new();
    scope.tensor_mut("t").unwrap();
    let err = scope.var("t").get_mutable::<Vec<Tensor>>().unwrap_err();
    assert!(matches!(err, Error::VariableTypeMismatch { ref name, .. } if name == "t"));
}
