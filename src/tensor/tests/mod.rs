mod tensor_basic;
